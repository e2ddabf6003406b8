//! github::client
//!
//! GitHub provider implementation over the REST API.
//!
//! # Design
//!
//! Token-bearer authentication with the standard API headers. The base
//! URL is configurable for GitHub Enterprise installations, and TLS
//! verification can be bypassed for self-signed enterprise endpoints.
//!
//! # Rate Limiting
//!
//! Rate-limit responses are never retried in-process. The pre-flight
//! check surfaces a distinguished error naming the remaining budget so
//! the caller can gate a whole run on it.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::types::RepoSlug;

use super::traits::{
    AuthError, GitHubError, Issue, IssueSpec, PrSpec, ProviderPr, PullRequestProvider, Reviewers,
};

/// Default GitHub API base URL.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "cascade-cli";

/// Cap on response-body snippets carried in errors.
const BODY_SNIPPET_LEN: usize = 200;

/// Per-request timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Rate-limit snapshot for the core resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Window size
    pub limit: u64,
    /// Remaining requests in the window
    pub remaining: u64,
    /// Unix timestamp of the window reset
    pub reset: u64,
}

impl RateLimit {
    /// Whether the remaining budget is critically low.
    ///
    /// Critical at or below 10% of the window: a budget of exactly
    /// one-tenth is already too thin for a fan-out run.
    pub fn is_critical(&self) -> bool {
        self.remaining.saturating_mul(10) <= self.limit
    }

    /// Human-readable reset time (UTC).
    pub fn reset_time(&self) -> String {
        match chrono::DateTime::from_timestamp(self.reset as i64, 0) {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => format!("epoch {}", self.reset),
        }
    }
}

/// GitHub API client.
///
/// Cheap to clone; the inner HTTP client is shared and safe for
/// concurrent use.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    api_base: String,
}

impl GitHubClient {
    /// Create a client against the public GitHub API.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_options(token, None, false)
    }

    /// Create a client with a custom base URL and optional TLS bypass.
    ///
    /// # Arguments
    ///
    /// * `token` - Bearer token
    /// * `api_base` - Enterprise API base (e.g. `https://github.corp/api/v3`)
    /// * `insecure` - Skip TLS certificate verification (self-signed
    ///   enterprise endpoints only)
    pub fn with_options(
        token: impl Into<String>,
        api_base: Option<String>,
        insecure: bool,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .build()
            .unwrap_or_default();

        Self {
            client,
            token: token.into(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    /// The configured API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build common headers for API requests.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            headers.insert(AUTHORIZATION, auth);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, repo: &RepoSlug, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            repo.owner(),
            repo.name(),
            path
        )
    }

    /// Send a request, racing it against cancellation.
    async fn send(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        repo: &str,
        request: RequestBuilder,
    ) -> Result<Response, GitHubError> {
        tokio::select! {
            response = request.headers(self.headers()).send() => {
                response.map_err(|e| GitHubError::Network {
                    operation: operation.to_string(),
                    repo: repo.to_string(),
                    message: e.to_string(),
                })
            }
            _ = cancel.cancelled() => Err(GitHubError::Network {
                operation: operation.to_string(),
                repo: repo.to_string(),
                message: "canceled".to_string(),
            }),
        }
    }

    /// Parse a success response or map the failure to a typed error.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        repo: &str,
        response: Response,
    ) -> Result<T, GitHubError> {
        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(|e| GitHubError::Api {
                operation: operation.to_string(),
                repo: repo.to_string(),
                status: status.as_u16(),
                body: format!("failed to parse response: {}", e),
            })
        } else {
            Err(self.error_for(operation, repo, status, response).await)
        }
    }

    /// Build the error for a non-success response.
    async fn error_for(
        &self,
        operation: &str,
        repo: &str,
        status: StatusCode,
        response: Response,
    ) -> GitHubError {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
        GitHubError::Api {
            operation: operation.to_string(),
            repo: repo.to_string(),
            status: status.as_u16(),
            body: snippet.trim().to_string(),
        }
    }

    /// Probe `/user` to validate the token.
    ///
    /// 200 means the token works; 401 is a distinguished invalid/expired
    /// token error; any other non-2xx is a generic validation failure.
    pub async fn validate_auth(&self, cancel: &CancellationToken) -> Result<(), GitHubError> {
        let url = format!("{}/user", self.api_base);
        let response = self
            .send(cancel, "validate_auth", "-", self.client.get(&url))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidToken.into()),
            status => Err(AuthError::ValidationFailed {
                status: status.as_u16(),
            }
            .into()),
        }
    }

    /// Read the current core rate limit.
    pub async fn rate_limit(&self, cancel: &CancellationToken) -> Result<RateLimit, GitHubError> {
        let url = format!("{}/rate_limit", self.api_base);
        let response = self
            .send(cancel, "rate_limit", "-", self.client.get(&url))
            .await?;
        let parsed: RateLimitResponse = self.handle_response("rate_limit", "-", response).await?;

        let core = parsed
            .resources
            .and_then(|r| r.core)
            .or(parsed.rate)
            .ok_or_else(|| GitHubError::Api {
                operation: "rate_limit".to_string(),
                repo: "-".to_string(),
                status: 200,
                body: "response carried no core rate limit".to_string(),
            })?;

        Ok(RateLimit {
            limit: core.limit,
            remaining: core.remaining,
            reset: core.reset,
        })
    }

    /// Pre-flight gate: fail when the remaining budget is critical.
    pub async fn check_rate_limit(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RateLimit, GitHubError> {
        let limit = self.rate_limit(cancel).await?;
        if limit.is_critical() {
            return Err(GitHubError::RateLimited {
                remaining: limit.remaining,
                limit: limit.limit,
                reset: limit.reset_time(),
            });
        }
        Ok(limit)
    }
}

#[async_trait]
impl PullRequestProvider for GitHubClient {
    async fn find_open_pr(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        head: &str,
    ) -> Result<Option<ProviderPr>, GitHubError> {
        // The API wants owner:branch for the head filter.
        let head_param = if head.contains(':') {
            head.to_string()
        } else {
            format!("{}:{}", repo.owner(), head)
        };
        let url = self.repo_url(repo, &format!("pulls?head={}&state=open", head_param));

        let repo_str = repo.to_string();
        let response = self
            .send(cancel, "find_open_pr", &repo_str, self.client.get(&url))
            .await?;
        let prs: Vec<GitHubPullRequest> = self
            .handle_response("find_open_pr", &repo_str, response)
            .await?;

        Ok(prs.into_iter().next().map(Into::into))
    }

    async fn create_pr(
        &self,
        cancel: &CancellationToken,
        spec: &PrSpec,
    ) -> Result<ProviderPr, GitHubError> {
        let url = self.repo_url(&spec.repo, "pulls");
        let body = CreatePrBody {
            head: &spec.head,
            base: &spec.base,
            title: &spec.title,
            body: &spec.body,
        };

        let repo_str = spec.repo.to_string();
        let response = self
            .send(
                cancel,
                "create_pr",
                &repo_str,
                self.client.post(&url).json(&body),
            )
            .await?;
        let pr: GitHubPullRequest = self.handle_response("create_pr", &repo_str, response).await?;
        Ok(pr.into())
    }

    async fn update_pr(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<ProviderPr, GitHubError> {
        let url = self.repo_url(repo, &format!("pulls/{}", number));
        let payload = UpdatePrBody { title, body };

        let repo_str = repo.to_string();
        let response = self
            .send(
                cancel,
                "update_pr",
                &repo_str,
                self.client.patch(&url).json(&payload),
            )
            .await?;
        let pr: GitHubPullRequest = self.handle_response("update_pr", &repo_str, response).await?;
        Ok(pr.into())
    }

    async fn add_labels(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        labels: &[String],
    ) -> Result<(), GitHubError> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(repo, &format!("issues/{}/labels", number));
        let body = AddLabelsBody { labels };

        let repo_str = repo.to_string();
        let response = self
            .send(
                cancel,
                "add_labels",
                &repo_str,
                self.client.post(&url).json(&body),
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.error_for("add_labels", &repo_str, status, response).await)
        }
    }

    async fn request_reviewers(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        number: u64,
        reviewers: &Reviewers,
    ) -> Result<(), GitHubError> {
        if reviewers.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(repo, &format!("pulls/{}/requested_reviewers", number));
        let body = RequestReviewersBody {
            reviewers: &reviewers.users,
            team_reviewers: &reviewers.teams,
        };

        let repo_str = repo.to_string();
        let response = self
            .send(
                cancel,
                "request_reviewers",
                &repo_str,
                self.client.post(&url).json(&body),
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self
                .error_for("request_reviewers", &repo_str, status, response)
                .await)
        }
    }

    async fn list_open_issues(
        &self,
        cancel: &CancellationToken,
        repo: &RepoSlug,
        labels: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Issue>, GitHubError> {
        let mut path = format!("issues?state=open&per_page={}&page={}", per_page, page);
        if !labels.is_empty() {
            path.push_str(&format!("&labels={}", labels.join(",")));
        }
        let url = self.repo_url(repo, &path);

        let repo_str = repo.to_string();
        let response = self
            .send(cancel, "list_open_issues", &repo_str, self.client.get(&url))
            .await?;
        let issues: Vec<GitHubIssue> = self
            .handle_response("list_open_issues", &repo_str, response)
            .await?;

        // The issues endpoint reports PRs as issues; keep real issues only.
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(Into::into)
            .collect())
    }

    async fn create_issue(
        &self,
        cancel: &CancellationToken,
        spec: &IssueSpec,
    ) -> Result<Issue, GitHubError> {
        let url = self.repo_url(&spec.repo, "issues");
        let body = CreateIssueBody {
            title: &spec.title,
            body: &spec.body,
            labels: &spec.labels,
        };

        let repo_str = spec.repo.to_string();
        let response = self
            .send(
                cancel,
                "create_issue",
                &repo_str,
                self.client.post(&url).json(&body),
            )
            .await?;
        let issue: GitHubIssue = self
            .handle_response("create_issue", &repo_str, response)
            .await?;
        Ok(issue.into())
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    body: &'a str,
}

/// Request body for updating a PR.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    title: &'a str,
    body: &'a str,
}

/// Request body for adding labels.
#[derive(Serialize)]
struct AddLabelsBody<'a> {
    labels: &'a [String],
}

/// Request body for requesting reviewers.
#[derive(Serialize)]
struct RequestReviewersBody<'a> {
    reviewers: &'a [String],
    team_reviewers: &'a [String],
}

/// Request body for creating an issue.
#[derive(Serialize)]
struct CreateIssueBody<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

/// GitHub PR response format (subset).
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    title: String,
    head: GitHubRef,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
}

/// GitHub ref (head/base) format.
#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

/// GitHub label format.
#[derive(Deserialize)]
struct GitHubLabel {
    name: String,
}

/// GitHub issue response format (subset).
#[derive(Deserialize)]
struct GitHubIssue {
    number: u64,
    html_url: String,
    title: String,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

/// Rate-limit response format.
///
/// The live API nests the core resource under `resources`; the top-level
/// `rate` field is a legacy mirror kept as a fallback.
#[derive(Deserialize)]
struct RateLimitResponse {
    resources: Option<RateLimitResources>,
    rate: Option<RateLimitCore>,
}

#[derive(Deserialize)]
struct RateLimitResources {
    core: Option<RateLimitCore>,
}

#[derive(Deserialize)]
struct RateLimitCore {
    limit: u64,
    remaining: u64,
    reset: u64,
}

impl From<GitHubPullRequest> for ProviderPr {
    fn from(pr: GitHubPullRequest) -> Self {
        ProviderPr {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.ref_name,
            title: pr.title,
            labels: pr.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

impl From<GitHubIssue> for Issue {
    fn from(issue: GitHubIssue) -> Self {
        Issue {
            number: issue.number,
            url: issue.html_url,
            title: issue.title,
        }
    }
}
