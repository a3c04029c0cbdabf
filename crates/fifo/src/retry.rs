//! Bounded retry for optimistic-concurrency conflicts.

use std::time::Duration;

use stocklot_core::{StockError, StockResult};

/// How often and how patiently a conflicted commit is retried.
///
/// Delays grow exponentially from `base_delay` (0ms, then base, 2x base,
/// 4x base, ...). Conflicts are the only transient error in this crate;
/// business outcomes such as insufficient stock are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are exhausted (in which case the last conflict is
/// returned).
pub fn with_conflict_retry<T, F>(policy: RetryPolicy, operation: &str, mut op: F) -> StockResult<T>
where
    F: FnMut() -> StockResult<T>,
{
    let mut last_error = None;
    for attempt in 0..=policy.max_retries {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after conflict: {err}"
                );
                std::thread::sleep(delay);
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| StockError::storage("retry loop exited without a result")))
}
