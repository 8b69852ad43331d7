use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MetricsRecord, StoreTarget};
use crate::utils::error::ScrapeError;

/// Final result of processing one store in one run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Success { record: MetricsRecord, attempts: u32 },
    Failure { store: StoreTarget, reason: ScrapeError, attempts: u32 },
}

impl ScrapeOutcome {
    pub fn store(&self) -> &StoreTarget {
        match self {
            ScrapeOutcome::Success { record, .. } => &record.store,
            ScrapeOutcome::Failure { store, .. } => store,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ScrapeOutcome::Success { attempts, .. } | ScrapeOutcome::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success { .. })
    }

    pub fn record(&self) -> Option<&MetricsRecord> {
        match self {
            ScrapeOutcome::Success { record, .. } => Some(record),
            ScrapeOutcome::Failure { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&ScrapeError> {
        match self {
            ScrapeOutcome::Success { .. } => None,
            ScrapeOutcome::Failure { reason, .. } => Some(reason),
        }
    }
}

/// One line of the append-only submission log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionLogEntry {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub merchant_id: String,
    pub marketplace_id: String,
    pub store_name: String,
    pub success: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<MetricsRecord>,
}

impl SubmissionLogEntry {
    pub fn from_outcome(run_id: Uuid, outcome: &ScrapeOutcome) -> Self {
        let store = outcome.store();
        Self {
            run_id,
            timestamp: Utc::now(),
            merchant_id: store.merchant_id.clone(),
            marketplace_id: store.marketplace_id.clone(),
            store_name: store.name.clone(),
            success: outcome.is_success(),
            attempts: outcome.attempts(),
            failure_kind: outcome.reason().map(|reason| reason.kind().to_string()),
            reason: outcome.reason().map(ToString::to_string),
            record: outcome.record().cloned(),
        }
    }
}
