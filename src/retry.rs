use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff, FixedInterval};
use tracing::{info, warn};

use crate::config::{Backoff, RetryConfig};

/// How a failure should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt after back-off.
    Transient,
    /// Retry after a fresh session has been acquired.
    SessionExpired,
    /// Report immediately.
    Terminal,
}

pub trait Classify {
    fn class(&self) -> FailureClass;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff: config.backoff,
            jitter: config.jitter,
        }
    }

    /// Delays slept between consecutive attempts, one fewer than `max_attempts`.
    pub fn delays(&self) -> Vec<Duration> {
        let count = self.max_attempts.saturating_sub(1) as usize;
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);

        let raw: Vec<Duration> = match self.backoff {
            Backoff::Fixed => FixedInterval::from_millis(base_ms).take(count).collect(),
            Backoff::Linear => (1..=count as u64)
                .map(|n| Duration::from_millis(base_ms.saturating_mul(n)))
                .collect(),
            // 2^n * base / 2 gives base, 2 * base, 4 * base, ...
            Backoff::Exponential => ExponentialBackoff::from_millis(2)
                .factor(base_ms)
                .map(|delay| delay / 2)
                .take(count)
                .collect(),
        };

        raw.into_iter()
            .map(|delay| if self.jitter { jitter(delay) } else { delay })
            .map(|delay| delay.min(self.max_delay))
            .collect()
    }
}

/// One retryable unit of work.
#[async_trait]
pub trait Attempt: Send {
    type Output: Send;
    type Error: Classify + Display + Send + Sync;

    /// Run attempt number `attempt` (1-based).
    async fn run(&mut self, attempt: u32) -> Result<Self::Output, Self::Error>;

    /// Called before the next attempt after a `SessionExpired` failure.
    async fn recover(&mut self, _error: &Self::Error) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalFailure<E> {
    pub last_reason: E,
    pub attempts_made: u32,
}

/// Run `op` until it succeeds, fails terminally, or `max_attempts` is spent.
pub async fn with_retry<A: Attempt>(
    policy: &RetryPolicy,
    op: &mut A,
) -> Result<Attempted<A::Output>, TerminalFailure<A::Error>> {
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays().into_iter();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match op.run(attempt).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        let class = error.class();
        if class == FailureClass::Terminal {
            warn!(attempts = attempt, reason = %error, "Non-retryable failure");
            return Err(TerminalFailure {
                last_reason: error,
                attempts_made: attempt,
            });
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, reason = %error, "Retry attempts exhausted");
            return Err(TerminalFailure {
                last_reason: error,
                attempts_made: attempt,
            });
        }

        let delay = delays.next().unwrap_or(policy.max_delay);
        info!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            reason = %error,
            "Attempt failed, retrying after back-off"
        );
        tokio::time::sleep(delay).await;

        if class == FailureClass::SessionExpired {
            if let Err(recover_error) = op.recover(&error).await {
                if recover_error.class() == FailureClass::Terminal {
                    warn!(attempts = attempt, reason = %recover_error, "Recovery failed");
                    return Err(TerminalFailure {
                        last_reason: recover_error,
                        attempts_made: attempt,
                    });
                }
                warn!(reason = %recover_error, "Recovery failed, next attempt will try again");
            }
        }
    }
}
