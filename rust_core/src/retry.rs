//! Bounded retry for transient failures
//!
//! Provides retry with capped exponential backoff. The caller decides which
//! errors are worth another attempt; everything else is returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt budget and backoff shape
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each retry
    pub base_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Policy without sleeping between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Execute an operation, retrying while `is_retriable` accepts the error
///
/// # Example
/// ```ignore
/// use auction_watch_core::retry::{execute_with_retry, RetryPolicy};
///
/// let notifications = execute_with_retry(
///     || store.list_active_notifications(),
///     &RetryPolicy::default(),
///     is_retriable_db_error,
/// ).await?;
/// ```
pub async fn execute_with_retry<F, Fut, T, E, R>(
    mut f: F,
    policy: &RetryPolicy,
    is_retriable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < policy.max_attempts && is_retriable(&e) => {
                let backoff = policy.backoff(attempt);
                warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {}ms",
                    attempt,
                    policy.max_attempts,
                    e,
                    backoff.as_millis()
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Check if a database error is likely transient
///
/// Looks through the whole cause chain, since store errors arrive wrapped in
/// `.context(..)`.
pub fn is_retriable_db_error(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        if let Some(db_err) = cause.downcast_ref::<sqlx::Error>() {
            if matches!(db_err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut) {
                return true;
            }
        }
        is_transient_message(&cause.to_string())
    })
}

fn is_transient_message(message: &str) -> bool {
    let err_str = message.to_lowercase();

    err_str.contains("connection")
        || err_str.contains("timeout")
        || err_str.contains("timed out")
        || err_str.contains("broken pipe")
        || err_str.contains("pool")
        || err_str.contains("could not serialize")
        || err_str.contains("deadlock detected")
        || err_str.contains("too many clients")
        || err_str.contains("server closed the connection")
}
