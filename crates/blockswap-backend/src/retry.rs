//! Fixed-delay retry for backend calls.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::BackendError;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    /// Pause after each failed attempt except the last.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. Zero attempts is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Run `attempt` until it succeeds or the policy is exhausted.
///
/// Each failed attempt but the last is logged at `warn` and followed by
/// `policy.delay`. The last failure is logged at `error` and returned.
/// Terminal outcomes such as not-found must be expressed as `Ok` values so
/// they are not retried.
pub async fn retry<T, F, Fut>(operation: &str, policy: RetryPolicy, mut attempt: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut current = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if current >= max_attempts => {
                error!(operation, attempts = current, error = %e, "backend call failed after retries");
                return Err(e);
            }
            Err(e) => {
                warn!(operation, attempt = current, max_attempts, error = %e, "backend call failed, retrying");
                tokio::time::sleep(policy.delay).await;
                current += 1;
            }
        }
    }
}
