//! github::mock
//!
//! Mock provider implementation for deterministic testing.
//!
//! # Design
//!
//! The mock provider stores PRs and issues in memory and records every
//! operation, so broker tests can assert call order (edit vs. create,
//! label reconciliation) without HTTP. Failure scenarios are injected per
//! operation.
//!
//! # Example
//!
//! ```
//! use cascade::core::types::RepoSlug;
//! use cascade::github::mock::MockProvider;
//! use cascade::github::PullRequestProvider;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let provider = MockProvider::new();
//! let repo = RepoSlug::parse("acme/svc").unwrap();
//! let cancel = CancellationToken::new();
//!
//! let found = provider.find_open_pr(&cancel, &repo, "feature").await.unwrap();
//! assert!(found.is_none());
//! # });
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::types::RepoSlug;

use super::traits::{
    GitHubError, Issue, IssueSpec, PrSpec, ProviderPr, PullRequestProvider, Reviewers,
};

/// Configuration for which operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Fail the next `find_open_pr`.
    FindOpenPr,
    /// Fail the next `create_pr`.
    CreatePr,
    /// Fail the next `update_pr`.
    UpdatePr,
    /// Fail the next `add_labels`.
    AddLabels,
    /// Fail the next `request_reviewers`.
    RequestReviewers,
    /// Fail the next `list_open_issues`.
    ListOpenIssues,
    /// Fail the next `create_issue`.
    CreateIssue,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    FindOpenPr {
        head: String,
    },
    CreatePr {
        head: String,
        base: String,
        title: String,
    },
    UpdatePr {
        number: u64,
        title: String,
    },
    AddLabels {
        number: u64,
        labels: Vec<String>,
    },
    RequestReviewers {
        number: u64,
        users: Vec<String>,
        teams: Vec<String>,
    },
    ListOpenIssues {
        labels: Vec<String>,
        page: u32,
    },
    CreateIssue {
        title: String,
        labels: Vec<String>,
    },
}

#[derive(Debug, Default)]
struct MockProviderInner {
    prs: Vec<ProviderPr>,
    issues: Vec<Issue>,
    next_pr_number: u64,
    next_issue_number: u64,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Mock provider for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    inner: Arc<Mutex<MockProviderInner>>,
}

impl MockProvider {
    /// Create an empty mock provider.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockProviderInner {
                next_pr_number: 1,
                next_issue_number: 1,
                ..Default::default()
            })),
        }
    }

    /// Create a mock provider with pre-existing open PRs.
    pub fn with_prs(prs: Vec<ProviderPr>) -> Self {
        let max = prs.iter().map(|p| p.number).max().unwrap_or(0);
        Self {
            inner: Arc::new(Mutex::new(MockProviderInner {
                prs,
                next_pr_number: max + 1,
                next_issue_number: 1,
                ..Default::default()
            })),
        }
    }

    /// Create a mock provider with pre-existing open issues.
    pub fn with_issues(issues: Vec<Issue>) -> Self {
        let max = issues.iter().map(|i| i.number).max().unwrap_or(0);
        Self {
            inner: Arc::new(Mutex::new(MockProviderInner {
                issues,
                next_pr_number: 1,
                next_issue_number: max + 1,
                ..Default::default()
            })),
        }
    }

    /// Make the next matching operation fail with a canned API error.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on = Some(fail_on);
        self
    }

    /// All recorded operations, in order.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// All PRs currently stored.
    pub fn all_prs(&self) -> Vec<ProviderPr> {
        self.inner.lock().unwrap().prs.clone()
    }

    /// All issues currently stored.
    pub fn all_issues(&self) -> Vec<Issue> {
        self.inner.lock().unwrap().issues.clone()
    }

    fn check_fail(&self, op: FailOn, operation: &str, repo: &RepoSlug) -> Result<(), GitHubError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_on == Some(op) {
            inner.fail_on = None;
            return Err(GitHubError::Api {
                operation: operation.to_string(),
                repo: repo.to_string(),
                status: 502,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }
}

#[async_trait]
impl PullRequestProvider for MockProvider {
    async fn find_open_pr(
        &self,
        _cancel: &CancellationToken,
        repo: &RepoSlug,
        head: &str,
    ) -> Result<Option<ProviderPr>, GitHubError> {
        self.record(MockOperation::FindOpenPr {
            head: head.to_string(),
        });
        self.check_fail(FailOn::FindOpenPr, "find_open_pr", repo)?;

        let inner = self.inner.lock().unwrap();
        Ok(inner.prs.iter().find(|p| p.head == head).cloned())
    }

    async fn create_pr(
        &self,
        _cancel: &CancellationToken,
        spec: &PrSpec,
    ) -> Result<ProviderPr, GitHubError> {
        self.record(MockOperation::CreatePr {
            head: spec.head.clone(),
            base: spec.base.clone(),
            title: spec.title.clone(),
        });
        self.check_fail(FailOn::CreatePr, "create_pr", &spec.repo)?;

        let mut inner = self.inner.lock().unwrap();
        let number = inner.next_pr_number;
        inner.next_pr_number += 1;
        let pr = ProviderPr {
            number,
            url: format!("https://github.com/{}/pull/{}", spec.repo, number),
            head: spec.head.clone(),
            title: spec.title.clone(),
            labels: Vec::new(),
        };
        inner.prs.push(pr.clone());
        Ok(pr)
    }

    async fn update_pr(
        &self,
        _cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        title: &str,
        _body: &str,
    ) -> Result<ProviderPr, GitHubError> {
        self.record(MockOperation::UpdatePr {
            number,
            title: title.to_string(),
        });
        self.check_fail(FailOn::UpdatePr, "update_pr", repo)?;

        let mut inner = self.inner.lock().unwrap();
        let pr = inner
            .prs
            .iter_mut()
            .find(|p| p.number == number)
            .ok_or_else(|| GitHubError::Api {
                operation: "update_pr".to_string(),
                repo: repo.to_string(),
                status: 404,
                body: format!("no PR #{}", number),
            })?;
        pr.title = title.to_string();
        Ok(pr.clone())
    }

    async fn add_labels(
        &self,
        _cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        labels: &[String],
    ) -> Result<(), GitHubError> {
        self.record(MockOperation::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        self.check_fail(FailOn::AddLabels, "add_labels", repo)?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(pr) = inner.prs.iter_mut().find(|p| p.number == number) {
            for label in labels {
                if !pr.labels.contains(label) {
                    pr.labels.push(label.clone());
                }
            }
        }
        Ok(())
    }

    async fn request_reviewers(
        &self,
        _cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        reviewers: &Reviewers,
    ) -> Result<(), GitHubError> {
        self.record(MockOperation::RequestReviewers {
            number,
            users: reviewers.users.clone(),
            teams: reviewers.teams.clone(),
        });
        self.check_fail(FailOn::RequestReviewers, "request_reviewers", repo)?;
        Ok(())
    }

    async fn list_open_issues(
        &self,
        _cancel: &CancellationToken,
        repo: &RepoSlug,
        labels: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Issue>, GitHubError> {
        self.record(MockOperation::ListOpenIssues {
            labels: labels.to_vec(),
            page,
        });
        self.check_fail(FailOn::ListOpenIssues, "list_open_issues", repo)?;

        let inner = self.inner.lock().unwrap();
        let start = ((page.max(1) - 1) as usize) * per_page as usize;
        Ok(inner
            .issues
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect())
    }

    async fn create_issue(
        &self,
        _cancel: &CancellationToken,
        spec: &IssueSpec,
    ) -> Result<Issue, GitHubError> {
        self.record(MockOperation::CreateIssue {
            title: spec.title.clone(),
            labels: spec.labels.clone(),
        });
        self.check_fail(FailOn::CreateIssue, "create_issue", &spec.repo)?;

        let mut inner = self.inner.lock().unwrap();
        let number = inner.next_issue_number;
        inner.next_issue_number += 1;
        let issue = Issue {
            number,
            url: format!("https://github.com/{}/issues/{}", spec.repo, number),
            title: spec.title.clone(),
        };
        inner.issues.push(issue.clone());
        Ok(issue)
    }
}
