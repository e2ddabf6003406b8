//! broker::pr
//!
//! Idempotent pull-request upsert with label and reviewer reconciliation.
//!
//! # Semantics
//!
//! - Dry-run returns a deterministic stub (number 0, merged labels) with
//!   no network I/O.
//! - Failed work items never open a PR.
//! - An existing open PR for the head branch is edited in place; labels
//!   are diffed case-insensitively and only the missing ones added.
//! - Label and reviewer reconciliation failures are non-fatal: the PR is
//!   still returned and the failure is logged as a warning.

use tokio_util::sync::CancellationToken;

use crate::broker::templates::{self, DEFAULT_PR_BODY, DEFAULT_PR_TITLE};
use crate::core::naming::merge_labels;
use crate::core::types::{Outcome, PullRequest, Status, Target, WorkItem};
use crate::github::{validate_pr_spec, GitHubError, PrSpec, PullRequestProvider, Reviewers};

use super::BrokerConfig;

/// What the upsert produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrDisposition {
    /// A PR was created, updated, or stubbed (dry-run).
    Upserted(PullRequest),
    /// No PR was opened; the reason says why.
    Skipped {
        /// Why no PR exists for this item
        reason: String,
    },
}

impl PrDisposition {
    /// The PR, when one was upserted.
    pub fn pull_request(&self) -> Option<&PullRequest> {
        match self {
            PrDisposition::Upserted(pr) => Some(pr),
            PrDisposition::Skipped { .. } => None,
        }
    }
}

/// Upsert the pull request for one executed work item.
pub async fn ensure_pr<P: PullRequestProvider>(
    cancel: &CancellationToken,
    provider: &P,
    config: &BrokerConfig,
    target: &Target,
    item: &WorkItem,
    outcome: &Outcome,
) -> Result<PrDisposition, GitHubError> {
    let labels = merge_labels(&config.default_labels, &item.pr.labels);

    if config.dry_run {
        return Ok(PrDisposition::Upserted(PullRequest {
            url: format!(
                "https://github.com/{}/compare/{}",
                item.repo, item.branch_name
            ),
            number: 0,
            repo: item.repo.clone(),
            labels,
        }));
    }

    match outcome.status() {
        Status::Failed => {
            return Ok(PrDisposition::Skipped {
                reason: "work item failed; no pull request opened".to_string(),
            });
        }
        Status::Skipped => {
            return Ok(PrDisposition::Skipped {
                reason: "work item skipped".to_string(),
            });
        }
        Status::Completed | Status::ManualReview => {}
    }

    let ctx = templates::context(target, item, outcome);
    let title_template = item
        .pr
        .title_template
        .as_deref()
        .or(config.pr_title_template.as_deref())
        .unwrap_or(DEFAULT_PR_TITLE);
    let body_template = item
        .pr
        .body_template
        .as_deref()
        .or(config.pr_body_template.as_deref())
        .unwrap_or(DEFAULT_PR_BODY);
    let title = templates::render(title_template, &ctx);
    let body = templates::render(body_template, &ctx);

    let base = item
        .base_branch
        .clone()
        .or_else(|| config.default_base.clone())
        .unwrap_or_else(|| "main".to_string());

    let spec = PrSpec {
        repo: item.repo.clone(),
        head: item.branch_name.clone(),
        base,
        title,
        body,
        labels: labels.clone(),
    };
    validate_pr_spec(&spec)?;

    let existing = provider
        .find_open_pr(cancel, &item.repo, &item.branch_name)
        .await?;
    let pr = match existing {
        Some(found) => {
            log::info!(
                "broker: updating existing pull request #{} for {}",
                found.number,
                item.repo
            );
            provider
                .update_pr(cancel, &item.repo, found.number, &spec.title, &spec.body)
                .await?
        }
        None => {
            log::info!("broker: creating pull request for {}", item.repo);
            provider.create_pr(cancel, &spec).await?
        }
    };

    // Reconcile labels: diff case-insensitively, add only what is missing.
    let current: Vec<String> = pr.labels.iter().map(|l| l.to_lowercase()).collect();
    let missing: Vec<String> = labels
        .iter()
        .filter(|l| !current.contains(&l.to_lowercase()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        if let Err(e) = provider
            .add_labels(cancel, &item.repo, pr.number, &missing)
            .await
        {
            log::warn!(
                "broker: label reconciliation failed for {}#{}: {}",
                item.repo,
                pr.number,
                e
            );
        }
    }

    let reviewers = Reviewers {
        users: merge_labels(&config.default_reviewers, &item.pr.reviewers),
        teams: merge_labels(&config.default_team_reviewers, &item.pr.team_reviewers),
    };
    if !reviewers.is_empty() {
        if let Err(e) = provider
            .request_reviewers(cancel, &item.repo, pr.number, &reviewers)
            .await
        {
            log::warn!(
                "broker: reviewer request failed for {}#{}: {}",
                item.repo,
                pr.number,
                e
            );
        }
    }

    Ok(PrDisposition::Upserted(PullRequest {
        url: pr.url,
        number: pr.number,
        repo: item.repo.clone(),
        labels,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoSlug;
    use crate::github::mock::{FailOn, MockOperation, MockProvider};
    use crate::github::ProviderPr;

    fn config() -> BrokerConfig {
        BrokerConfig {
            default_labels: vec!["automation:cascade".to_string()],
            ..Default::default()
        }
    }

    fn target() -> Target {
        Target::new("github.com/acme/lib", "v2.0.0").unwrap()
    }

    fn item() -> WorkItem {
        let mut item = WorkItem::new(
            RepoSlug::parse("acme/svc").unwrap(),
            "github.com/acme/svc",
            "cascade-update-lib-v2-0-0",
        );
        item.commit_message = "chore: bump lib".to_string();
        item.pr.labels = vec!["automation".to_string(), "dependency-update".to_string()];
        item
    }

    fn completed() -> Outcome {
        Outcome {
            status: Some(Status::Completed),
            commit_hash: "deadbeef".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn dry_run_returns_stub_without_network() {
        let provider = MockProvider::new();
        let mut cfg = config();
        cfg.dry_run = true;

        let disposition = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &cfg,
            &target(),
            &item(),
            &completed(),
        )
        .await
        .unwrap();

        let pr = disposition.pull_request().unwrap();
        assert_eq!(pr.number, 0);
        assert_eq!(
            pr.labels,
            vec!["automation:cascade", "automation", "dependency-update"]
        );
        assert!(provider.operations().is_empty());
    }

    #[tokio::test]
    async fn failed_outcome_opens_no_pr() {
        let provider = MockProvider::new();
        let outcome = Outcome {
            status: Some(Status::Failed),
            reason: "tests failed".to_string(),
            ..Default::default()
        };

        let disposition = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &item(),
            &outcome,
        )
        .await
        .unwrap();

        assert!(matches!(disposition, PrDisposition::Skipped { .. }));
        assert!(provider.operations().is_empty());
    }

    #[tokio::test]
    async fn creates_when_no_open_pr_exists() {
        let provider = MockProvider::new();

        let disposition = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &item(),
            &completed(),
        )
        .await
        .unwrap();

        let pr = disposition.pull_request().unwrap();
        assert_eq!(pr.number, 1);

        let ops = provider.operations();
        assert!(ops
            .iter()
            .any(|op| matches!(op, MockOperation::CreatePr { .. })));
        assert!(!ops
            .iter()
            .any(|op| matches!(op, MockOperation::UpdatePr { .. })));
    }

    #[tokio::test]
    async fn edits_existing_pr_and_keeps_its_number() {
        let provider = MockProvider::with_prs(vec![ProviderPr {
            number: 17,
            url: "https://github.com/acme/svc/pull/17".to_string(),
            head: "cascade-update-lib-v2-0-0".to_string(),
            title: "old title".to_string(),
            labels: vec![],
        }]);

        let disposition = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &item(),
            &completed(),
        )
        .await
        .unwrap();

        let pr = disposition.pull_request().unwrap();
        assert_eq!(pr.number, 17);
        assert_eq!(
            pr.labels,
            vec!["automation:cascade", "automation", "dependency-update"]
        );

        let ops = provider.operations();
        assert!(ops
            .iter()
            .any(|op| matches!(op, MockOperation::UpdatePr { number: 17, .. })));
        assert!(!ops
            .iter()
            .any(|op| matches!(op, MockOperation::CreatePr { .. })));
    }

    #[tokio::test]
    async fn label_diff_is_case_insensitive() {
        let provider = MockProvider::with_prs(vec![ProviderPr {
            number: 3,
            url: "https://github.com/acme/svc/pull/3".to_string(),
            head: "cascade-update-lib-v2-0-0".to_string(),
            title: "t".to_string(),
            labels: vec!["AUTOMATION".to_string()],
        }]);

        ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &item(),
            &completed(),
        )
        .await
        .unwrap();

        let added = provider
            .operations()
            .into_iter()
            .find_map(|op| match op {
                MockOperation::AddLabels { labels, .. } => Some(labels),
                _ => None,
            })
            .unwrap();
        // "automation" is already present (differently cased); only the
        // genuinely missing labels are added.
        assert_eq!(
            added,
            vec!["automation:cascade".to_string(), "dependency-update".to_string()]
        );
    }

    #[tokio::test]
    async fn label_failure_does_not_poison_the_pr() {
        let provider = MockProvider::new().fail_on(FailOn::AddLabels);

        let disposition = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &item(),
            &completed(),
        )
        .await
        .unwrap();

        let pr = disposition.pull_request().unwrap();
        assert_eq!(pr.number, 1);
        assert_eq!(
            pr.labels,
            vec!["automation:cascade", "automation", "dependency-update"]
        );
    }

    #[tokio::test]
    async fn reviewer_failure_is_non_fatal_too() {
        let provider = MockProvider::new().fail_on(FailOn::RequestReviewers);
        let mut work = item();
        work.pr.reviewers = vec!["alice".to_string()];

        let disposition = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &work,
            &completed(),
        )
        .await
        .unwrap();

        assert!(disposition.pull_request().is_some());
    }

    #[tokio::test]
    async fn reviewers_merge_defaults_and_item() {
        let provider = MockProvider::new();
        let mut cfg = config();
        cfg.default_reviewers = vec!["bot-team-lead".to_string()];
        let mut work = item();
        work.pr.reviewers = vec!["alice".to_string(), "bot-team-lead".to_string()];

        ensure_pr(
            &CancellationToken::new(),
            &provider,
            &cfg,
            &target(),
            &work,
            &completed(),
        )
        .await
        .unwrap();

        let requested = provider
            .operations()
            .into_iter()
            .find_map(|op| match op {
                MockOperation::RequestReviewers { users, .. } => Some(users),
                _ => None,
            })
            .unwrap();
        assert_eq!(requested, vec!["bot-team-lead".to_string(), "alice".to_string()]);
    }

    #[tokio::test]
    async fn invalid_title_is_rejected_before_any_call() {
        let provider = MockProvider::new();
        let mut work = item();
        work.pr.title_template = Some(String::new());

        let err = ensure_pr(
            &CancellationToken::new(),
            &provider,
            &config(),
            &target(),
            &work,
            &completed(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GitHubError::PrValidation(_)));
        assert!(provider.operations().is_empty());
    }
}
