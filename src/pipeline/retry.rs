use log::{debug, warn};
use std::time::Duration;

use crate::errors::TranslationError;
use crate::providers::Translator;

/// Bounded retries with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff after the first failed attempt
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `retry_count` retries after the first attempt
    pub fn with_retries(retry_count: u32, backoff_base_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: retry_count.saturating_add(1),
            backoff_base_ms,
            max_backoff_ms,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::with_retries(0, 0, 0)
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let backoff_ms = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(backoff_ms.min(self.max_backoff_ms))
    }
}

/// Translate with retries and an optional per-attempt timeout.
///
/// Only transient errors are retried. Returns the final result together
/// with the number of attempts made.
pub async fn translate_with_retry(
    translator: &dyn Translator,
    segment_source: &str,
    policy: &RetryPolicy,
    attempt_timeout: Option<Duration>,
) -> (Result<String, TranslationError>, u32) {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, translator.translate(segment_source)).await {
                Ok(result) => result,
                Err(_) => Err(TranslationError::Timeout(limit.as_secs())),
            },
            None => translator.translate(segment_source).await,
        };

        match result {
            Ok(text) => return (Ok(text), attempt),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed: {} - retrying in {:?}",
                    translator.name(),
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!("{} giving up after {} attempt(s): {}", translator.name(), attempt, e);
                return (Err(e), attempt);
            }
        }
    }
}
