use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::NotificationsConfig;
use crate::models::{FleetSummary, ScrapeOutcome, SubmissionLogEntry};
use crate::notifiers::format::{
    format_fleet_summary, format_run_failure, format_store_failure, format_store_report, Thresholds,
};
use crate::notifiers::{ChatSink, MessageKind};
use crate::submission_log::SubmissionLog;
use crate::utils::error::AppError;
use crate::utils::metrics::{record_notification, record_store_outcome};

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub thresholds: Thresholds,
    pub summary_title: String,
    /// Pause between consecutive chat posts.
    pub post_delay: Duration,
}

impl AggregatorSettings {
    pub fn from_config(config: &NotificationsConfig) -> Self {
        Self {
            thresholds: Thresholds::from_config(config),
            summary_title: config.summary_title.clone(),
            post_delay: Duration::from_millis(config.post_delay_ms),
        }
    }
}

/// Collects store outcomes as they arrive and reports them.
pub struct ResultAggregator {
    run_id: Uuid,
    sink: Arc<dyn ChatSink>,
    log: Arc<SubmissionLog>,
    settings: AggregatorSettings,
    outcomes: Vec<ScrapeOutcome>,
    notifications_sent: u32,
    notifications_failed: u32,
}

impl ResultAggregator {
    pub fn new(run_id: Uuid, sink: Arc<dyn ChatSink>, log: Arc<SubmissionLog>, settings: AggregatorSettings) -> Self {
        Self {
            run_id,
            sink,
            log,
            settings,
            outcomes: Vec::new(),
            notifications_sent: 0,
            notifications_failed: 0,
        }
    }

    pub fn outcomes(&self) -> &[ScrapeOutcome] {
        &self.outcomes
    }

    pub fn notifications_sent(&self) -> u32 {
        self.notifications_sent
    }

    pub fn notifications_failed(&self) -> u32 {
        self.notifications_failed
    }

    /// Log the outcome durably, then post the store message.
    ///
    /// Only a submission log failure is returned; chat delivery problems are
    /// logged and counted.
    pub async fn record(&mut self, outcome: ScrapeOutcome) -> Result<(), AppError> {
        let entry = SubmissionLogEntry::from_outcome(self.run_id, &outcome);
        self.log.append(&entry).await?;
        record_store_outcome(outcome.is_success());

        let now = Local::now();
        let text = match &outcome {
            ScrapeOutcome::Success { record, attempts } => {
                info!(store = %record.store.name, attempts, orders = record.totals.orders, "Store succeeded");
                format_store_report(record, &self.settings.thresholds, now)
            }
            ScrapeOutcome::Failure { store, reason, attempts } => {
                error!(store = %store.name, attempts, reason = %reason, "Store failed");
                format_store_failure(store, &reason.to_string(), *attempts, now)
            }
        };

        self.post(MessageKind::Store, &text).await;
        self.outcomes.push(outcome);
        Ok(())
    }

    /// Build the fleet summary and post it. Call once, after the last store.
    pub async fn finalize(&mut self) -> FleetSummary {
        let summary = FleetSummary::from_outcomes(self.run_id, &self.outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Run finished"
        );

        let text = format_fleet_summary(
            &summary,
            &self.settings.summary_title,
            &self.settings.thresholds,
            Local::now(),
        );
        self.post(MessageKind::Summary, &text).await;
        summary
    }

    async fn post(&mut self, kind: MessageKind, text: &str) {
        let posted = self.notifications_sent + self.notifications_failed;
        if posted > 0 && !self.settings.post_delay.is_zero() {
            tokio::time::sleep(self.settings.post_delay).await;
        }

        match self.sink.send(kind, text).await {
            Ok(()) => {
                self.notifications_sent += 1;
                record_notification(kind.as_str(), true);
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Notification not delivered");
                self.notifications_failed += 1;
                record_notification(kind.as_str(), false);
            }
        }
    }
}

/// Report a run that could not start to the summary channel.
pub async fn notify_run_failure(sink: &dyn ChatSink, title: &str, reason: &str) -> bool {
    let text = format_run_failure(title, reason, Local::now());
    match sink.send(MessageKind::Summary, &text).await {
        Ok(()) => {
            record_notification(MessageKind::Summary.as_str(), true);
            true
        }
        Err(e) => {
            warn!(error = %e, "Run failure notification not delivered");
            record_notification(MessageKind::Summary.as_str(), false);
            false
        }
    }
}
