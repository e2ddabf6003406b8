//! broker::notify::github_issues
//!
//! Failure tracking through GitHub issues, deduplicated by title.
//!
//! # Semantics
//!
//! Fires only for failed outcomes when the effective configuration has it
//! enabled. Idempotency comes from a title search over open issues
//! carrying the configured labels: an existing issue with the same title
//! (case-insensitive) is reported instead of creating a duplicate.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::broker::templates::{self, DEFAULT_ISSUE_BODY, DEFAULT_ISSUE_TITLE};
use crate::core::types::{GitHubIssueConfig, Outcome, Status, Target, WorkItem};
use crate::github::{IssueSpec, PullRequestProvider};

use super::{NotificationError, NotificationResult, Notifier};

/// Pagination cap for the dedup search.
const MAX_PAGES: u32 = 3;

/// Page size for the dedup search.
const PER_PAGE: u32 = 50;

/// Files (or finds) a failure-tracking issue for failed work items.
pub struct GitHubIssueNotifier<P: PullRequestProvider> {
    provider: Arc<P>,
    defaults: GitHubIssueConfig,
    target: Target,
}

impl<P: PullRequestProvider> GitHubIssueNotifier<P> {
    /// Create an issue notifier over a provider.
    pub fn new(provider: Arc<P>, defaults: GitHubIssueConfig, target: Target) -> Self {
        Self {
            provider,
            defaults,
            target,
        }
    }

    fn skipped(reason: &str) -> NotificationResult {
        NotificationResult {
            channel: "github-issues".to_string(),
            message: format!("Issue skipped ({})", reason),
        }
    }
}

#[async_trait]
impl<P: PullRequestProvider> Notifier for GitHubIssueNotifier<P> {
    async fn send(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError> {
        if outcome.status() != Status::Failed {
            return Ok(Self::skipped("status not failed"));
        }

        let effective = self
            .defaults
            .overlaid(item.notifications.github_issues.as_ref());
        if !effective.enabled {
            return Ok(Self::skipped("disabled"));
        }

        let ctx = templates::context(&self.target, item, outcome);
        let title = templates::render_strict("issue title", DEFAULT_ISSUE_TITLE, &ctx).map_err(
            |e| NotificationError::Misconfigured {
                channel: "github-issues".to_string(),
                reason: e.to_string(),
            },
        )?;
        let body = templates::render(DEFAULT_ISSUE_BODY, &ctx);

        // Dedup: walk open issues with the effective labels and match the
        // title case-insensitively.
        let title_key = title.to_lowercase();
        for page in 1..=MAX_PAGES {
            let issues = self
                .provider
                .list_open_issues(cancel, &item.repo, &effective.labels, page, PER_PAGE)
                .await
                .map_err(|e| NotificationError::Delivery {
                    channel: "github-issues".to_string(),
                    attempts: 1,
                    cause: e.to_string(),
                })?;

            if let Some(existing) = issues
                .iter()
                .find(|i| i.title.to_lowercase() == title_key)
            {
                log::debug!(
                    "broker: failure issue already open for {}: {}",
                    item.repo,
                    existing.url
                );
                return Ok(NotificationResult {
                    channel: "github-issues".to_string(),
                    message: existing.url.clone(),
                });
            }

            if issues.len() < PER_PAGE as usize {
                break;
            }
        }

        let spec = IssueSpec {
            repo: item.repo.clone(),
            title,
            body,
            labels: effective.labels.clone(),
        };
        let issue = self
            .provider
            .create_issue(cancel, &spec)
            .await
            .map_err(|e| NotificationError::Delivery {
                channel: "github-issues".to_string(),
                attempts: 1,
                cause: e.to_string(),
            })?;

        log::info!("broker: filed failure issue for {}: {}", item.repo, issue.url);
        Ok(NotificationResult {
            channel: "github-issues".to_string(),
            message: issue.url,
        })
    }
}
