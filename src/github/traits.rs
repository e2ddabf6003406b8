//! github::traits
//!
//! Provider trait for the GitHub surface the broker drives.
//!
//! # Design
//!
//! The `PullRequestProvider` trait is async because provider operations
//! involve network I/O. All methods take the cancellation scope as their
//! first parameter; a canceled scope aborts the in-flight request.
//!
//! Provider failures never compromise local repository state: by the time
//! the broker runs, the branch is already pushed. Failures surface as
//! typed errors for the caller to log or gate on.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::types::RepoSlug;

/// Errors from provider operations.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Authentication is missing, invalid, or could not be validated.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The API answered with a non-success status.
    #[error("github {operation} failed for {repo}: status {status}: {body}")]
    Api {
        /// The operation that failed (e.g. `create_pr`)
        operation: String,
        /// Repository the call targeted
        repo: String,
        /// HTTP status code
        status: u16,
        /// Response body snippet
        body: String,
    },

    /// The request never produced a response.
    #[error("github {operation} failed for {repo}: {message}")]
    Network {
        /// The operation that failed
        operation: String,
        /// Repository the call targeted
        repo: String,
        /// Transport-level detail
        message: String,
    },

    /// The remaining rate-limit budget is critically low.
    ///
    /// Never retried in-process; callers gate on it before starting work.
    #[error("rate limit critical: {remaining} of {limit} requests remaining, resets at {reset}")]
    RateLimited {
        /// Remaining requests in the window
        remaining: u64,
        /// Window size
        limit: u64,
        /// Reset time, formatted for humans
        reset: String,
    },

    /// PR input did not pass validation.
    #[error(transparent)]
    PrValidation(#[from] PrValidationError),

    /// The operation is deliberately stubbed.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl GitHubError {
    /// Whether this error indicates rate limiting.
    ///
    /// A 403 with a non-empty body is treated as rate limiting: GitHub
    /// reports secondary rate limits that way rather than with a 429.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GitHubError::RateLimited { .. } => true,
            GitHubError::Api { status: 403, body, .. } => !body.is_empty(),
            _ => false,
        }
    }
}

/// Errors from credential discovery and token validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token in the environment.
    #[error("no github token found; set one of GITHUB_TOKEN, GITHUB_ACCESS_TOKEN, GH_TOKEN")]
    MissingToken,

    /// The validation probe answered 401.
    #[error("github token is invalid or expired")]
    InvalidToken,

    /// The validation probe failed for another reason.
    #[error("token validation failed with status {status}")]
    ValidationFailed {
        /// HTTP status of the probe
        status: u16,
    },
}

/// PR input rejected before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pull request {field}: {reason}")]
pub struct PrValidationError {
    /// The offending field
    pub field: &'static str,
    /// Why it was rejected
    pub reason: String,
}

/// Inputs for creating or updating a pull request.
#[derive(Debug, Clone)]
pub struct PrSpec {
    /// Repository the PR targets
    pub repo: RepoSlug,
    /// Head branch (the branch with changes)
    pub head: String,
    /// Base branch (the branch to merge into)
    pub base: String,
    /// Rendered title
    pub title: String,
    /// Rendered body
    pub body: String,
    /// Labels to reconcile after the upsert
    pub labels: Vec<String>,
}

/// Validate a PR spec against the API's input rules.
///
/// Branch refs must be non-empty, at most 250 characters, without leading
/// or trailing `/`, `..`, or `//`. The title is required and capped at
/// 256 characters; the body at 65536. Labels are capped at 100, each
/// 1-50 characters without `, ; " ' < > &` (a colon is allowed here even
/// though sanitization strips it).
pub fn validate_pr_spec(spec: &PrSpec) -> Result<(), PrValidationError> {
    validate_branch_ref("base", &spec.base)?;
    validate_branch_ref("head", &spec.head)?;

    if spec.title.trim().is_empty() {
        return Err(PrValidationError {
            field: "title",
            reason: "must not be empty".to_string(),
        });
    }
    if spec.title.chars().count() > 256 {
        return Err(PrValidationError {
            field: "title",
            reason: "exceeds 256 characters".to_string(),
        });
    }
    if spec.body.chars().count() > 65536 {
        return Err(PrValidationError {
            field: "body",
            reason: "exceeds 65536 characters".to_string(),
        });
    }
    if spec.labels.len() > 100 {
        return Err(PrValidationError {
            field: "labels",
            reason: "more than 100 labels".to_string(),
        });
    }
    for label in &spec.labels {
        let len = label.chars().count();
        if len == 0 || len > 50 {
            return Err(PrValidationError {
                field: "labels",
                reason: format!("label '{}' must be 1-50 characters", label),
            });
        }
        if label
            .chars()
            .any(|c| matches!(c, ',' | ';' | '"' | '\'' | '<' | '>' | '&'))
        {
            return Err(PrValidationError {
                field: "labels",
                reason: format!("label '{}' contains a forbidden character", label),
            });
        }
    }
    Ok(())
}

fn validate_branch_ref(field: &'static str, value: &str) -> Result<(), PrValidationError> {
    if value.is_empty() {
        return Err(PrValidationError {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.chars().count() > 250 {
        return Err(PrValidationError {
            field,
            reason: "exceeds 250 characters".to_string(),
        });
    }
    if value.starts_with('/') || value.ends_with('/') {
        return Err(PrValidationError {
            field,
            reason: "must not start or end with '/'".to_string(),
        });
    }
    if value.contains("..") || value.contains("//") {
        return Err(PrValidationError {
            field,
            reason: "must not contain '..' or '//'".to_string(),
        });
    }
    Ok(())
}

/// A pull request as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPr {
    /// PR number
    pub number: u64,
    /// Web URL
    pub url: String,
    /// Head branch name
    pub head: String,
    /// Current title
    pub title: String,
    /// Labels currently on the PR
    pub labels: Vec<String>,
}

/// Reviewers to request on a PR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reviewers {
    /// Individual reviewers (usernames)
    pub users: Vec<String>,
    /// Team reviewers (team slugs)
    pub teams: Vec<String>,
}

impl Reviewers {
    /// Check if there are any reviewers to request.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.teams.is_empty()
    }
}

/// Inputs for creating a failure-tracking issue.
#[derive(Debug, Clone)]
pub struct IssueSpec {
    /// Repository the issue targets
    pub repo: RepoSlug,
    /// Rendered title (also the dedup key)
    pub title: String,
    /// Rendered body
    pub body: String,
    /// Labels used both for search and creation
    pub labels: Vec<String>,
}

/// An issue as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Issue number
    pub number: u64,
    /// Web URL
    pub url: String,
    /// Current title
    pub title: String,
}

/// The provider capability for PRs and issues.
///
/// Implementations must be `Send + Sync`. Label and reviewer calls are
/// idempotent on the provider side, so a retried reconciliation is
/// harmless.
#[async_trait]
pub trait PullRequestProvider: Send + Sync {
    /// Find the open PR for `owner:head`, if one exists.
    async fn find_open_pr(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        head: &str,
    ) -> Result<Option<ProviderPr>, GitHubError>;

    /// Create a new pull request.
    async fn create_pr(
        &self,
        cancel: &CancellationToken,
        spec: &PrSpec,
    ) -> Result<ProviderPr, GitHubError>;

    /// Update an existing pull request's title and body.
    async fn update_pr(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<ProviderPr, GitHubError>;

    /// Add labels to a PR (or issue) by number.
    async fn add_labels(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        labels: &[String],
    ) -> Result<(), GitHubError>;

    /// Request reviewers for a PR.
    async fn request_reviewers(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        reviewers: &Reviewers,
    ) -> Result<(), GitHubError>;

    /// List one page of open issues carrying all of `labels`.
    async fn list_open_issues(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        labels: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Issue>, GitHubError>;

    /// Create a new issue.
    async fn create_issue(
        &self,
        cancel: &CancellationToken,
        spec: &IssueSpec,
    ) -> Result<Issue, GitHubError>;
}
