//! broker::notify
//!
//! Notification dispatch: a polymorphic notifier capability with Slack,
//! webhook, GitHub-issue, multi, and no-op variants.
//!
//! # Semantics
//!
//! - `Multi` fans out to every child and reports the first success;
//!   it errors only when all children failed.
//! - `NoOp` is the sentinel for runs with no integrations configured.
//! - Slack and webhook delivery retries transient failures with linear
//!   backoff (see [`retry`]).
//!
//! Notification failures never block the main path; the driver logs them
//! and moves on.

pub mod github_issues;
pub mod retry;
pub mod slack;
pub mod webhook;

pub use github_issues::GitHubIssueNotifier;
pub use retry::{is_transient, RetryPolicy};
pub use slack::SlackNotifier;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::types::{Outcome, WorkItem};

/// Result of one delivered (or deliberately skipped) notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    /// The channel that handled it (`slack`, `webhook`, `github-issues`,
    /// `noop`, or a concrete Slack channel name)
    pub channel: String,
    /// What was delivered, or why nothing was
    pub message: String,
}

/// Errors from notification delivery.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// A notifier gave up after its retry budget.
    #[error("notification via {channel} failed after {attempts} attempt(s): {cause}")]
    Delivery {
        /// The channel that failed
        channel: String,
        /// HTTP calls actually made
        attempts: u32,
        /// The final underlying error
        cause: String,
    },

    /// Cancellation arrived during a retry backoff sleep.
    #[error("notification via {channel} canceled during backoff after {attempts} attempt(s)")]
    Canceled {
        /// The channel that was interrupted
        channel: String,
        /// HTTP calls made before cancellation
        attempts: u32,
    },

    /// Every notifier in a chain failed.
    #[error("all notifiers failed: {causes}")]
    AllFailed {
        /// Joined child error messages
        causes: String,
    },

    /// The notifier could not build its message or configuration.
    #[error("notification via {channel} misconfigured: {reason}")]
    Misconfigured {
        /// The channel involved
        channel: String,
        /// What was missing or malformed
        reason: String,
    },
}

/// The notification capability.
///
/// Implementations must be `Send + Sync`; the HTTP clients inside are
/// safe for concurrent use across worker tasks.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification for one work item's outcome.
    async fn send(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError>;
}

/// Fans out to a list of notifiers.
///
/// Every child is attempted; the first successful result is returned.
/// An error is produced only when all children failed.
pub struct MultiNotifier {
    children: Vec<Box<dyn Notifier>>,
}

impl MultiNotifier {
    /// Compose a chain of notifiers.
    pub fn new(children: Vec<Box<dyn Notifier>>) -> Self {
        Self { children }
    }

    /// Number of children in the chain.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn send(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError> {
        if self.children.is_empty() {
            return NoOpNotifier.send(cancel, item, outcome).await;
        }

        let mut first_success: Option<NotificationResult> = None;
        let mut failures: Vec<String> = Vec::new();

        for child in &self.children {
            match child.send(cancel, item, outcome).await {
                Ok(result) => {
                    if first_success.is_none() {
                        first_success = Some(result);
                    }
                }
                Err(e) => {
                    log::warn!("broker: notifier failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        match first_success {
            Some(result) => Ok(result),
            None => Err(NotificationError::AllFailed {
                causes: failures.join("; "),
            }),
        }
    }
}

/// Sentinel notifier for runs with nothing configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn send(
        &self,
        _cancel: &CancellationToken,
        _item: &WorkItem,
        _outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError> {
        Ok(NotificationResult {
            channel: "noop".to_string(),
            message: "Notification skipped (no integrations configured)".to_string(),
        })
    }
}
