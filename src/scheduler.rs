use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{is_valid_cron, AppConfig};
use crate::pipeline::execute;
use crate::utils::error::AppError;

fn scheduler_error(e: impl std::fmt::Display) -> AppError {
    AppError::Scheduler(e.to_string())
}

/// Claim the run slot, or `None` while another run holds it.
fn try_begin_run(running: &Arc<Mutex<()>>) -> Option<OwnedMutexGuard<()>> {
    Arc::clone(running).try_lock_owned().ok()
}

/// Runs the pipeline on a cron schedule, one run at a time.
pub struct RunScheduler {
    scheduler: JobScheduler,
    cron_expression: String,
    job_id: Option<Uuid>,
    running: Arc<Mutex<()>>,
}

impl RunScheduler {
    pub async fn new(cron_expression: &str) -> Result<Self, AppError> {
        if !is_valid_cron(cron_expression) {
            return Err(AppError::Scheduler(format!(
                "Invalid cron expression '{}': expected 6 or 7 fields starting with seconds",
                cron_expression
            )));
        }

        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        Ok(Self {
            scheduler,
            cron_expression: cron_expression.to_string(),
            job_id: None,
            running: Arc::new(Mutex::new(())),
        })
    }

    pub fn cron_expression(&self) -> &str {
        &self.cron_expression
    }

    /// Register the collection job. A tick that fires while the previous run
    /// is still going is skipped.
    pub async fn schedule(&mut self, config: AppConfig) -> Result<Uuid, AppError> {
        let config = Arc::new(config);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(self.cron_expression.as_str(), move |job_id, _scheduler| {
            let config = Arc::clone(&config);
            let running = Arc::clone(&running);

            Box::pin(async move {
                let Some(_guard) = try_begin_run(&running) else {
                    warn!(job_id = %job_id, "Previous run still in progress, skipping this tick");
                    return;
                };

                info!(job_id = %job_id, "Scheduled run starting");
                match execute(config.as_ref().clone()).await {
                    Ok(report) => info!(
                        run_id = %report.run_id,
                        succeeded = report.summary.succeeded,
                        failed = report.summary.failed,
                        "Scheduled run complete"
                    ),
                    Err(e) => error!(error = %e, "Scheduled run failed"),
                }
            })
        })
        .map_err(scheduler_error)?;

        let job_id = self.scheduler.add(job).await.map_err(scheduler_error)?;
        self.job_id = Some(job_id);
        info!(cron = %self.cron_expression, job_id = %job_id, "Run scheduled");
        Ok(job_id)
    }

    pub async fn start(&mut self) -> Result<(), AppError> {
        self.scheduler.start().await.map_err(scheduler_error)?;
        info!("Scheduler started");
        Ok(())
    }

    /// Block until Ctrl-C, then stop the scheduler.
    pub async fn run_until_shutdown(mut self) -> Result<(), AppError> {
        self.start().await?;
        tokio::signal::ctrl_c().await?;

        info!("Shutdown requested");
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await.map_err(scheduler_error)?;
        }
        self.scheduler.shutdown().await.map_err(scheduler_error)?;
        Ok(())
    }
}
