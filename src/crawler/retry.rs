//! Bounded retry with exponential backoff
//!
//! A failed request is classified into a [`FailureKind`]; the
//! [`RetryPolicy`] then turns the kind and the attempt number into a
//! [`RetryDecision`]. [`RetryPolicy::run`] drives that state machine around an
//! async operation until it succeeds, fails permanently, or runs out of
//! attempts.
//!
//! # Delay Calculation
//!
//! ```text
//! delay(attempt) = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
//! ```

use crate::config::RetryConfig;
use crate::FetchError;
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Upper bound of the random jitter added to each delay
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May succeed on another attempt (timeouts, resets, retryable statuses)
    Transient,

    /// Will not succeed no matter how often it is retried
    Permanent,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt`
    Retry { delay: Duration, attempt: u32 },

    /// Stop and surface the error
    GiveUp { reason: String },
}

/// Retry configuration for fetches
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    retry_statuses: HashSet<u16>,
    retry_on_timeout: bool,
    retry_on_connect: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Builds a policy from the `[retry]` configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            retry_statuses: config.retry_statuses.iter().copied().collect(),
            retry_on_timeout: config.retry_on_timeout,
            retry_on_connect: config.retry_on_connect,
        }
    }

    /// Overrides the attempt limit
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Overrides the backoff shape and disables jitter
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self.multiplier = multiplier;
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Classifies a fetch error for this policy
    pub fn classify(&self, error: &FetchError) -> FailureKind {
        let transient = match error {
            FetchError::Status { status, .. } => self.is_retryable_status(*status),
            FetchError::Timeout { .. } => self.retry_on_timeout,
            FetchError::Connect { .. } | FetchError::Network { .. } => self.retry_on_connect,
            FetchError::InvalidUrl { .. } | FetchError::Failed { .. } => false,
        };

        if transient {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }

    /// Decides what to do after attempt number `attempt` (1-based) failed
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if kind == FailureKind::Permanent {
            return RetryDecision::GiveUp {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay_for(attempt),
            attempt: attempt + 1,
        }
    }

    /// Backoff before the attempt following `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter {
            let mut rng = rand::thread_rng();
            Duration::from_millis(rng.gen_range(0..=MAX_JITTER.as_millis() as u64))
        } else {
            Duration::ZERO
        };

        Duration::from_millis(capped_ms as u64) + jitter
    }

    /// Runs `op` until it succeeds or the policy gives up
    ///
    /// Permanent errors are returned as they are after a single attempt.
    /// Transient errors that exhaust the attempt limit are wrapped in
    /// [`FetchError::Failed`] together with the attempt count.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let kind = self.classify(&error);
            match self.should_retry(kind, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        url,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp { reason } => {
                    tracing::debug!("Giving up on {}: {}", url, reason);
                    return Err(match kind {
                        FailureKind::Permanent => error,
                        FailureKind::Transient => FetchError::Failed {
                            url: url.to_string(),
                            attempts: attempt,
                            source: Box::new(error),
                        },
                    });
                }
            }
        }
    }
}
