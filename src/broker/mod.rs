//! broker
//!
//! Post-execution fan-out: pull-request upsert and notification dispatch.
//!
//! # Responsibilities
//!
//! After the executor produces an outcome, the broker:
//!
//! 1. Renders PR title/body from templates and upserts the PR (edit if an
//!    open PR exists for the head branch, create otherwise), reconciling
//!    labels and reviewer requests non-fatally.
//! 2. Dispatches notifications through whichever sinks are configured for
//!    the item: Slack, webhook, and GitHub failure issues. Any sink
//!    succeeding counts as success; only total failure is an error.
//!
//! In dry-run mode both paths return deterministic stubs without network
//! I/O.
//!
//! The broker borrows the outcome; it never mutates executor state, and
//! nothing here reaches back into the execution pipeline.

pub mod notify;
pub mod pr;
pub mod templates;

pub use notify::{
    GitHubIssueNotifier, MultiNotifier, NoOpNotifier, NotificationError, NotificationResult,
    Notifier, RetryPolicy, SlackNotifier, WebhookNotifier,
};
pub use pr::PrDisposition;
pub use templates::TemplateError;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::config::Defaults;
use crate::core::types::{GitHubIssueConfig, Outcome, Target, WorkItem};
use crate::github::{GitHubError, PullRequestProvider};

/// Broker configuration: defaults composed under every work item.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// Return stubs instead of performing network I/O
    pub dry_run: bool,
    /// Base branch for PRs when the item does not set one
    pub default_base: Option<String>,
    /// Default PR title template
    pub pr_title_template: Option<String>,
    /// Default PR body template
    pub pr_body_template: Option<String>,
    /// Labels applied to every PR (before item labels)
    pub default_labels: Vec<String>,
    /// Reviewers requested on every PR
    pub default_reviewers: Vec<String>,
    /// Team reviewers requested on every PR
    pub default_team_reviewers: Vec<String>,
    /// Slack bot token; Slack delivery is off without it
    pub slack_token: Option<String>,
    /// Default Slack channel
    pub slack_channel: Option<String>,
    /// Default webhook URL
    pub webhook_url: Option<String>,
    /// Failure-issue defaults
    pub github_issues: GitHubIssueConfig,
    /// Retry policy for Slack and webhook delivery
    pub retry: RetryPolicy,
}

impl BrokerConfig {
    /// Build broker configuration from manifest defaults.
    pub fn from_manifest(defaults: &Defaults, dry_run: bool, slack_token: Option<String>) -> Self {
        Self {
            dry_run,
            default_base: defaults.base_branch.clone(),
            pr_title_template: defaults.pr.title_template.clone(),
            pr_body_template: defaults.pr.body_template.clone(),
            default_labels: defaults.pr.labels.clone(),
            default_reviewers: defaults.pr.reviewers.clone(),
            default_team_reviewers: defaults.pr.team_reviewers.clone(),
            slack_token,
            slack_channel: defaults.notifications.slack_channel.clone(),
            webhook_url: defaults.notifications.webhook_url.clone(),
            github_issues: defaults
                .notifications
                .github_issues
                .clone()
                .unwrap_or_default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// The broker: PR lifecycle plus notification fan-out for one run.
pub struct Broker<P: PullRequestProvider + 'static> {
    provider: Arc<P>,
    config: BrokerConfig,
    target: Target,
}

impl<P: PullRequestProvider + 'static> Broker<P> {
    /// Create a broker over a provider for one run's target.
    pub fn new(provider: Arc<P>, target: Target, config: BrokerConfig) -> Self {
        Self {
            provider,
            config,
            target,
        }
    }

    /// Upsert the pull request for an executed work item.
    pub async fn ensure_pr(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<PrDisposition, GitHubError> {
        pr::ensure_pr(
            cancel,
            self.provider.as_ref(),
            &self.config,
            &self.target,
            item,
            outcome,
        )
        .await
    }

    /// Dispatch notifications for an executed work item.
    ///
    /// The sink chain is assembled per item so per-item overrides (a
    /// different Slack channel, a dedicated webhook, issue tracking
    /// toggled on) take effect without global configuration.
    pub async fn notify(
        &self,
        cancel: &CancellationToken,
        item: &WorkItem,
        outcome: &Outcome,
    ) -> Result<NotificationResult, NotificationError> {
        if self.config.dry_run {
            return Ok(NotificationResult {
                channel: "noop".to_string(),
                message: "Notification skipped (dry-run)".to_string(),
            });
        }

        let mut children: Vec<Box<dyn Notifier>> = Vec::new();

        let slack_channel = item
            .notifications
            .slack_channel
            .as_ref()
            .or(self.config.slack_channel.as_ref());
        if let (Some(token), Some(_)) = (&self.config.slack_token, slack_channel) {
            children.push(Box::new(
                SlackNotifier::new(
                    token.clone(),
                    self.config.slack_channel.clone(),
                    self.target.clone(),
                )
                .with_retry(self.config.retry),
            ));
        }

        let webhook_configured = item.notifications.webhook_url.is_some()
            || self.config.webhook_url.is_some();
        if webhook_configured {
            children.push(Box::new(
                WebhookNotifier::new(self.config.webhook_url.clone(), self.target.clone())
                    .with_retry(self.config.retry),
            ));
        }

        let issues_effective = self
            .config
            .github_issues
            .overlaid(item.notifications.github_issues.as_ref());
        if issues_effective.enabled {
            children.push(Box::new(GitHubIssueNotifier::new(
                self.provider.clone(),
                self.config.github_issues.clone(),
                self.target.clone(),
            )));
        }

        MultiNotifier::new(children).send(cancel, item, outcome).await
    }
}
