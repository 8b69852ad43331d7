use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ScrapeOutcome, StoreTotals};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSummary {
    pub name: String,
    pub success: bool,
    pub attempts: u32,
    pub orders: u64,
    pub uph: f64,
    pub late_rate: f64,
    pub inf_rate: f64,
    pub top_inf_item: Option<String>,
    pub reason: Option<String>,
}

/// Fleet-wide rollup of one run, posted once at the end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_orders: u64,
    pub total_units: f64,
    pub fleet_uph: f64,
    pub fleet_late_rate: f64,
    pub fleet_inf_rate: f64,
    pub stores: Vec<StoreSummary>,
}

impl FleetSummary {
    pub fn from_outcomes(run_id: Uuid, outcomes: &[ScrapeOutcome]) -> Self {
        let mut fleet = StoreTotals::default();
        let mut stores = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            let summary = match outcome {
                ScrapeOutcome::Success { record, attempts } => {
                    fleet.add(&record.totals);
                    StoreSummary {
                        name: record.store.name.clone(),
                        success: true,
                        attempts: *attempts,
                        orders: record.totals.orders,
                        uph: record.totals.uph(),
                        late_rate: record.totals.late_rate(),
                        inf_rate: record.totals.inf_rate(),
                        top_inf_item: record.inventory.first().map(|item| item.product_name.clone()),
                        reason: None,
                    }
                }
                ScrapeOutcome::Failure { store, reason, attempts } => StoreSummary {
                    name: store.name.clone(),
                    success: false,
                    attempts: *attempts,
                    orders: 0,
                    uph: 0.0,
                    late_rate: 0.0,
                    inf_rate: 0.0,
                    top_inf_item: None,
                    reason: Some(reason.to_string()),
                },
            };
            stores.push(summary);
        }

        let succeeded = stores.iter().filter(|s| s.success).count();

        Self {
            run_id,
            generated_at: Utc::now(),
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            total_orders: fleet.orders,
            total_units: fleet.units,
            fleet_uph: fleet.uph(),
            fleet_late_rate: fleet.late_rate(),
            fleet_inf_rate: fleet.inf_rate(),
            stores,
        }
    }

    pub fn failed_stores(&self) -> impl Iterator<Item = &StoreSummary> {
        self.stores.iter().filter(|s| !s.success)
    }
}
