//! broker::notify::retry
//!
//! Linear-backoff retry for HTTP notification delivery.
//!
//! # Policy
//!
//! Sleep `delay × attempt` between attempts. The backoff is linear, not
//! exponential, for parity with the existing delivery path. Defaults: 2s
//! delay, 3 retries (4 attempts total). Only transient errors retry;
//! anything else breaks immediately. The backoff sleep races the
//! cancellation scope.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::NotificationError;

/// Substrings that mark an error as transient.
const TRANSIENT_MARKERS: [&str; 4] = ["timeout", "connection", "temporary", "status 5"];

/// Retry policy for a notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 = 4 attempts total)
    pub max_retries: u32,
    /// Base backoff; the sleep before attempt N+1 is `delay × N`
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Heuristic transient-error classifier.
///
/// An error is transient iff its message contains one of `timeout`,
/// `connection`, `temporary`, or `status 5` (5xx statuses render that
/// way). Auth failures, 4xx responses, and malformed payloads are not
/// retried.
pub fn is_transient(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

/// Run `op` under the retry policy.
///
/// `op` receives the 1-based attempt number and reports failure as a
/// message string. The attempt count carried in the returned error equals
/// the number of times `op` actually ran.
pub async fn with_retry<F, Fut, T>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    channel: &str,
    op: F,
) -> Result<T, NotificationError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let cause = match op(attempts).await {
            Ok(value) => return Ok(value),
            Err(cause) => cause,
        };

        let out_of_budget = attempts > policy.max_retries;
        if out_of_budget || !is_transient(&cause) {
            return Err(NotificationError::Delivery {
                channel: channel.to_string(),
                attempts,
                cause,
            });
        }

        log::debug!(
            "broker: transient notification failure via {} (attempt {}): {}",
            channel,
            attempts,
            cause
        );

        let backoff = policy.delay * attempts;
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => {
                return Err(NotificationError::Canceled {
                    channel: channel.to_string(),
                    attempts,
                });
            }
        }
    }
}
