use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::{notify_run_failure, AggregatorSettings, ResultAggregator};
use crate::browser::{BrowserDriver, ChromeDriver};
use crate::config::{AppConfig, SessionStrategy};
use crate::models::{FleetSummary, MetricsRecord, ScrapeOutcome, StoreTarget};
use crate::notifiers::{ChatSink, WebhookNotifier};
use crate::retry::{with_retry, Attempt, Attempted, RetryPolicy, TerminalFailure};
use crate::scraper::StoreScraper;
use crate::session::{Credentials, SessionController, SessionSettings};
use crate::submission_log::SubmissionLog;
use crate::utils::error::{AppError, AuthError, ScrapeError};
use crate::utils::metrics::record_scrape_attempt;

/// Everything a run needs, built once by the caller.
pub struct RunContext {
    pub config: AppConfig,
    pub driver: Arc<dyn BrowserDriver>,
    pub sink: Arc<dyn ChatSink>,
    pub log: Arc<SubmissionLog>,
}

impl RunContext {
    /// Launch Chrome, build the webhook client and open the submission log.
    pub async fn from_config(config: AppConfig) -> Result<Self, AppError> {
        let browser_config = config.browser.clone();
        let driver = tokio::task::spawn_blocking(move || ChromeDriver::launch(&browser_config))
            .await
            .map_err(|e| AppError::Internal(format!("Browser launch task failed: {}", e)))??;

        let sink = WebhookNotifier::new(&config.notifications)?;
        let log = SubmissionLog::open(config.output.submissions_path())?;

        Ok(Self {
            config,
            driver: Arc::new(driver),
            sink: Arc::new(sink),
            log: Arc::new(log),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub summary: FleetSummary,
    pub session_acquisitions: u32,
    pub notifications_sent: u32,
    pub notifications_failed: u32,
}

struct AcquireAttempt<'a> {
    controller: &'a mut SessionController,
}

#[async_trait]
impl<'a> Attempt for AcquireAttempt<'a> {
    type Output = ();
    type Error = AuthError;

    async fn run(&mut self, _attempt: u32) -> Result<(), AuthError> {
        self.controller.acquire().await.map(|_| ())
    }
}

struct StoreAttempt<'a> {
    controller: &'a mut SessionController,
    scraper: &'a StoreScraper,
    store: &'a StoreTarget,
    attempts_made: u32,
}

#[async_trait]
impl<'a> Attempt for StoreAttempt<'a> {
    type Output = MetricsRecord;
    type Error = ScrapeError;

    async fn run(&mut self, attempt: u32) -> Result<MetricsRecord, ScrapeError> {
        self.attempts_made = attempt;
        record_scrape_attempt();
        info!(store = %self.store.name, attempt, "Scraping store");

        let session = self
            .controller
            .acquire()
            .await
            .map_err(ScrapeError::Reauthentication)?;
        let result = self.scraper.scrape(session, self.store).await;

        // Never hand a dropped session to a later attempt or store.
        if matches!(result, Err(ScrapeError::SessionExpired)) {
            self.controller.invalidate();
        }
        result
    }

    async fn recover(&mut self, _error: &ScrapeError) -> Result<(), ScrapeError> {
        info!(store = %self.store.name, "Session expired, logging in again");
        self.controller
            .reacquire()
            .await
            .map(|_| ())
            .map_err(ScrapeError::Reauthentication)
    }
}

/// A terminal login failure means no later store can be scraped either.
fn lost_session(reason: &ScrapeError) -> Option<&AuthError> {
    match reason {
        ScrapeError::Reauthentication(auth) if auth.is_terminal() => Some(auth),
        _ => None,
    }
}

/// One collection run over every configured store.
pub async fn run_pipeline(ctx: &RunContext) -> Result<RunReport, AppError> {
    let run_id = Uuid::new_v4();
    run_stores(ctx, run_id)
        .instrument(info_span!("run", run_id = %run_id))
        .await
}

async fn run_stores(ctx: &RunContext, run_id: Uuid) -> Result<RunReport, AppError> {
    let config = &ctx.config;
    let policy = RetryPolicy::from_config(&config.retry);
    let store_timeout = Duration::from_secs(config.retry.store_timeout_secs);
    let settings = AggregatorSettings::from_config(&config.notifications);
    let summary_title = settings.summary_title.clone();

    let mut controller = SessionController::new(
        Arc::clone(&ctx.driver),
        Credentials::from_config(&config.auth),
        SessionSettings::from_config(config),
    );
    let scraper = StoreScraper::from_config(config);
    let mut aggregator = ResultAggregator::new(run_id, Arc::clone(&ctx.sink), Arc::clone(&ctx.log), settings);

    info!(stores = config.stores.len(), "Starting run");

    if !config.stores.is_empty() {
        let mut acquire = AcquireAttempt {
            controller: &mut controller,
        };
        if let Err(TerminalFailure {
            last_reason,
            attempts_made,
        }) = with_retry(&policy, &mut acquire).await
        {
            error!(attempts = attempts_made, reason = %last_reason, "Could not establish a session, aborting run");
            notify_run_failure(ctx.sink.as_ref(), &summary_title, &last_reason.to_string()).await;
            controller.close().await;
            return Err(AppError::Auth(last_reason));
        }
    }

    let mut session_lost: Option<AuthError> = None;

    for (index, store) in config.stores.iter().enumerate() {
        if let Some(cause) = &session_lost {
            warn!(store = %store.name, "Skipping store, session unavailable");
            aggregator
                .record(ScrapeOutcome::Failure {
                    store: store.clone(),
                    reason: ScrapeError::Reauthentication(cause.clone()),
                    attempts: 0,
                })
                .await?;
            continue;
        }

        if index > 0 && config.retry.session_strategy == SessionStrategy::PerStore {
            controller.invalidate();
        }

        let mut attempt = StoreAttempt {
            controller: &mut controller,
            scraper: &scraper,
            store,
            attempts_made: 0,
        };
        let result = tokio::time::timeout(store_timeout, with_retry(&policy, &mut attempt)).await;

        let outcome = match result {
            Ok(Ok(Attempted { value, attempts })) => ScrapeOutcome::Success {
                record: value,
                attempts,
            },
            Ok(Err(TerminalFailure {
                last_reason,
                attempts_made,
            })) => ScrapeOutcome::Failure {
                store: store.clone(),
                reason: last_reason,
                attempts: attempts_made,
            },
            Err(_) => {
                warn!(store = %store.name, timeout_secs = store_timeout.as_secs(), "Store exceeded its time budget");
                ScrapeOutcome::Failure {
                    store: store.clone(),
                    reason: ScrapeError::Timeout(format!(
                        "store not finished within {}s",
                        store_timeout.as_secs()
                    )),
                    attempts: attempt.attempts_made.max(1),
                }
            }
        };

        if let Some(auth) = outcome.reason().and_then(lost_session) {
            error!(store = %store.name, reason = %auth, "Session could not be re-established");
            session_lost = Some(auth.clone());
        }

        aggregator.record(outcome).await?;
    }

    let summary = aggregator.finalize().await;
    controller.close().await;

    Ok(RunReport {
        run_id,
        summary,
        session_acquisitions: controller.acquisitions(),
        notifications_sent: aggregator.notifications_sent(),
        notifications_failed: aggregator.notifications_failed(),
    })
}

/// Build a live context from `config` and run once.
pub async fn execute(config: AppConfig) -> Result<RunReport, AppError> {
    let ctx = RunContext::from_config(config).await?;
    run_pipeline(&ctx).await
}
