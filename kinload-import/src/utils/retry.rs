//! Write retry logic
//!
//! Retries store operations that fail transiently, with exponential backoff.

use crate::store::StoreError;
use std::time::{Duration, Instant};

/// Upper bound on a single backoff sleep
const MAX_BACKOFF_MS: u64 = 1000;

/// How hard to retry a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubles after each retry
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
        }
    }
}

/// Retry a store operation while it fails with [`StoreError::Transient`]
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If transient and attempts remain: log WARN, backoff, retry
/// 4. Otherwise return the error (a transient error here means retries ran out)
///
/// **Backoff Strategy:**
/// - Initial delay: `policy.initial_backoff_ms`
/// - Max delay: 1000ms
/// - Multiplier: 2 (exponential)
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "commit individual")
/// * `policy` - Attempt limit and initial backoff
/// * `operation` - Async closure that performs the store operation
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut backoff_ms = policy.initial_backoff_ms;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying store operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Store operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(StoreError::Transient(message)) if attempt < max_attempts => {
                let next_backoff_ms = backoff_ms.min(MAX_BACKOFF_MS);

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = next_backoff_ms,
                    error = %message,
                    "Transient store failure, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(next_backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
            Err(err) => {
                if matches!(err, StoreError::Transient(_)) {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Store operation failed: retries exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}
