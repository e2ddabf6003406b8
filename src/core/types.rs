//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Target`] - The upstream module/version pair driving a run
//! - [`RepoSlug`] - Validated `owner/name` repository identifier
//! - [`WorkItem`] - One dependent repository to update
//! - [`CommandSpec`] / [`CommandResult`] - User-supplied commands and their captured outcomes
//! - [`DependencyImpact`] - Observed before/after versions of the target module
//! - [`Status`] / [`Outcome`] - Terminal classification of a work item
//!
//! # Validation
//!
//! `RepoSlug` enforces validity at construction time. Invalid identifiers
//! cannot be represented, so later stages (clone URLs, API paths, issue
//! titles) never need to re-check.
//!
//! # Examples
//!
//! ```
//! use cascade::core::types::{RepoSlug, Status};
//!
//! let slug = RepoSlug::parse("acme/svc").unwrap();
//! assert_eq!(slug.owner(), "acme");
//! assert_eq!(slug.name(), "svc");
//!
//! assert_eq!(Status::ManualReview.to_string(), "manual-review");
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from input validation.
///
/// Validation failures are never retried; every variant names the offending
/// field so the message is actionable in logs and notification bodies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty.
    #[error("{field} must not be empty")]
    Empty {
        /// The field that was empty
        field: &'static str,
    },

    /// A repository identifier did not parse.
    #[error("invalid repository '{value}': {reason}")]
    Repo {
        /// The identifier as supplied
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A field held a malformed value.
    #[error("invalid {field} '{value}': {reason}")]
    Field {
        /// The field that failed
        field: &'static str,
        /// The value as supplied
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// The upstream module and version a run fans out.
///
/// Immutable for the lifetime of a run. `version` may be empty or `"latest"`,
/// meaning "no version pin" when handed to the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Module path of the upstream dependency (e.g. `github.com/acme/lib`)
    pub module: String,
    /// Version to bump to (e.g. `v2.0.0`)
    pub version: String,
}

impl Target {
    /// Create a target, rejecting an empty module path.
    pub fn new(module: impl Into<String>, version: impl Into<String>) -> Result<Self, ValidationError> {
        let module = module.into();
        if module.trim().is_empty() {
            return Err(ValidationError::Empty { field: "module" });
        }
        Ok(Self {
            module,
            version: version.into(),
        })
    }

    /// Whether the version pins to a concrete release.
    ///
    /// Empty and `"latest"` both mean "whatever the toolchain resolves".
    pub fn is_pinned(&self) -> bool {
        !self.version.is_empty() && self.version != "latest"
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_pinned() {
            write!(f, "{}@{}", self.module, self.version)
        } else {
            write!(f, "{}", self.module)
        }
    }
}

/// A validated `owner/name` repository identifier.
///
/// Accepted input forms:
/// - `owner/name`
/// - `https://host/.../owner/name[.git]`
/// - `http://host/.../owner/name[.git]`
///
/// Owner and name must be 1-100 characters, start and end with an ASCII
/// alphanumeric, and contain only `[A-Za-z0-9._-]` in between.
///
/// # Example
///
/// ```
/// use cascade::core::types::RepoSlug;
///
/// let slug = RepoSlug::parse("https://github.com/acme/svc.git").unwrap();
/// assert_eq!(slug.to_string(), "acme/svc");
///
/// assert!(RepoSlug::parse("not a repo").is_err());
/// assert!(RepoSlug::parse("/svc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    /// Parse a repository identifier into `owner/name`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Repo` naming the offending segment if the
    /// identifier does not match any accepted form.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::Repo {
                value: input.to_string(),
                reason: "identifier is empty".to_string(),
            });
        }

        // URL forms keep only the final owner/name path segments.
        let path = if let Some(rest) = input
            .strip_prefix("https://")
            .or_else(|| input.strip_prefix("http://"))
        {
            let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
            // Drop the host.
            if segments.len() < 3 {
                return Err(ValidationError::Repo {
                    value: input.to_string(),
                    reason: "URL does not contain an owner/name path".to_string(),
                });
            }
            let name = segments.pop().unwrap();
            let owner = segments.pop().unwrap();
            format!("{}/{}", owner, name)
        } else {
            input.to_string()
        };

        let path = path.strip_suffix(".git").unwrap_or(&path);
        let mut parts = path.splitn(2, '/');
        let owner = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");

        Self::validate_segment(owner, "owner", input)?;
        Self::validate_segment(name, "name", input)?;

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    fn validate_segment(segment: &str, field: &str, input: &str) -> Result<(), ValidationError> {
        if segment.is_empty() {
            return Err(ValidationError::Repo {
                value: input.to_string(),
                reason: format!("{} is empty", field),
            });
        }
        if segment.len() > 100 {
            return Err(ValidationError::Repo {
                value: input.to_string(),
                reason: format!("{} exceeds 100 characters", field),
            });
        }
        let bytes = segment.as_bytes();
        let edge_ok = |b: u8| b.is_ascii_alphanumeric();
        let inner_ok = |b: u8| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-';
        if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
            return Err(ValidationError::Repo {
                value: input.to_string(),
                reason: format!("{} must start and end with a letter or digit", field),
            });
        }
        if !bytes.iter().all(|&b| inner_ok(b)) {
            return Err(ValidationError::Repo {
                value: input.to_string(),
                reason: format!("{} contains characters outside [A-Za-z0-9._-]", field),
            });
        }
        Ok(())
    }

    /// The repository owner (user or organization).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical HTTPS URL on github.com.
    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoSlug> for String {
    fn from(slug: RepoSlug) -> Self {
        slug.to_string()
    }
}

/// A user-supplied command to run inside a work item's worktree.
///
/// Invalid iff `argv` is empty. `dir` is joined under the worktree root; it
/// is a convenience, not a security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program and arguments
    pub argv: Vec<String>,
    /// Working directory relative to the worktree root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl CommandSpec {
    /// Build a command from argv strings.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            dir: None,
        }
    }

    /// Set the relative working directory.
    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Whether the command has no program to run.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Captured outcome of one command execution.
///
/// `output` holds combined stdout and stderr, preserved even when the
/// command failed or was cut short by a deadline.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// The command that ran
    pub command: CommandSpec,
    /// Combined stdout + stderr
    pub output: String,
    /// Failure detail, if the command did not succeed
    pub error: Option<String>,
    /// Process exit code (-1 when the process was killed or never exited)
    pub exit_code: i32,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl CommandResult {
    /// Whether the command completed successfully.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }
}

/// Observed effect of the update on the dependent's module graph.
///
/// Created empty at executor entry and filled in by the dependency
/// inspector before and after the toolchain runs. Detection is advisory;
/// parse problems land in `notes` and never fail the work item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyImpact {
    /// Module path being bumped
    pub module: String,
    /// Version the run is bumping to
    pub target_version: String,
    /// Version found before the update
    pub old_version: String,
    /// Whether the pre-update version was found
    pub old_version_detected: bool,
    /// Version found after the update
    pub new_version: String,
    /// Whether the post-update version was found
    pub new_version_detected: bool,
    /// True iff the update observably changed the resolved version
    pub applied: bool,
    /// Non-fatal observations (parse failures, phase notes)
    pub notes: Vec<String>,
}

impl DependencyImpact {
    /// Create an impact record for a module/version pair.
    pub fn new(module: impl Into<String>, target_version: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            target_version: target_version.into(),
            ..Default::default()
        }
    }

    /// Recompute `applied` from the detected versions.
    ///
    /// `applied` is true iff the new version was detected and differs from
    /// the old one.
    pub fn recompute_applied(&mut self) {
        self.applied = self.new_version_detected && self.new_version != self.old_version;
    }

    /// One-line human summary, e.g. `github.com/acme/lib -> v2.0.0 (was v1.9.0)`.
    pub fn summary(&self) -> String {
        let new = if self.new_version_detected {
            self.new_version.as_str()
        } else {
            "unknown"
        };
        let old = if self.old_version_detected {
            self.old_version.as_str()
        } else {
            "unknown"
        };
        format!("{} -> {} (was {})", self.module, new, old)
    }
}

/// Terminal classification of a work item.
///
/// The wire form is lowercase and hyphenated; it appears in notification
/// payloads and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Every phase succeeded, or there was nothing to commit.
    Completed,
    /// Tests passed but at least one extra command failed; the branch was
    /// still pushed so a human can inspect it.
    ManualReview,
    /// A mandatory phase failed.
    Failed,
    /// The work item's skip flag was set; nothing ran.
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Completed => "completed",
            Status::ManualReview => "manual-review",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Pull request configuration for one work item.
///
/// Templates override the broker defaults; labels are merged with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrConfig {
    /// Title template (`{{ key }}` substitution)
    pub title_template: Option<String>,
    /// Body template
    pub body_template: Option<String>,
    /// Reviewer usernames to request
    pub reviewers: Vec<String>,
    /// Team slugs to request
    pub team_reviewers: Vec<String>,
    /// Labels to apply (merged after broker defaults)
    pub labels: Vec<String>,
}

/// GitHub-issue failure tracking configuration.
///
/// A per-item override composes over the broker default: the enabled flag is
/// always taken from the override when one is present; labels are taken from
/// the override only when non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubIssueConfig {
    /// Whether failure issues are filed at all
    pub enabled: bool,
    /// Labels used both to search for existing issues and on creation
    pub labels: Vec<String>,
}

impl Default for GitHubIssueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            labels: Vec::new(),
        }
    }
}

impl GitHubIssueConfig {
    /// Compose a per-item override over these defaults.
    pub fn overlaid(&self, over: Option<&GitHubIssueConfig>) -> GitHubIssueConfig {
        match over {
            None => self.clone(),
            Some(o) => GitHubIssueConfig {
                enabled: o.enabled,
                labels: if o.labels.is_empty() {
                    self.labels.clone()
                } else {
                    o.labels.clone()
                },
            },
        }
    }
}

/// Notification routing for one work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    /// Slack channel override
    pub slack_channel: Option<String>,
    /// Webhook URL override
    pub webhook_url: Option<String>,
    /// GitHub-issue failure tracking override
    pub github_issues: Option<GitHubIssueConfig>,
}

/// One dependent repository to update.
///
/// Produced by the planner; immutable during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Repository identifier (validated `owner/name`)
    pub repo: RepoSlug,
    /// Module path of the dependent itself
    pub module: String,
    /// Base branch for the worktree (None = repository default branch)
    pub base_branch: Option<String>,
    /// Head branch the update lands on
    pub branch_name: String,
    /// Commit message for the update
    pub commit_message: String,
    /// When set, the item is reported skipped without any side effects
    pub skip: bool,
    /// Per-command deadline (None = executor default)
    pub timeout: Option<Duration>,
    /// Extra environment for tests and extra commands (override wins)
    pub env: BTreeMap<String, String>,
    /// Test commands, run in order, halting on first failure
    pub tests: Vec<CommandSpec>,
    /// Extra commands (formatters, generators); failures downgrade to
    /// manual-review instead of failed when tests passed
    pub extra_commands: Vec<CommandSpec>,
    /// PR rendering and review configuration
    pub pr: PrConfig,
    /// Notification routing
    pub notifications: NotificationConfig,
}

impl WorkItem {
    /// Minimal work item for a repo/branch pair; used by tests and the planner.
    pub fn new(repo: RepoSlug, module: impl Into<String>, branch_name: impl Into<String>) -> Self {
        Self {
            repo,
            module: module.into(),
            base_branch: None,
            branch_name: branch_name.into(),
            commit_message: String::new(),
            skip: false,
            timeout: None,
            env: BTreeMap::new(),
            tests: Vec::new(),
            extra_commands: Vec::new(),
            pr: PrConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Aggregated result of executing one work item.
///
/// Built exclusively by the executor; the broker borrows it to render PRs
/// and notifications.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Terminal status
    pub status: Option<Status>,
    /// Human-readable reason (always set for skipped/failed)
    pub reason: String,
    /// Commit hash when a commit was created, empty otherwise
    pub commit_hash: String,
    /// Results of every test command attempted
    pub test_results: Vec<CommandResult>,
    /// Results of every extra command attempted
    pub extra_results: Vec<CommandResult>,
    /// Observed dependency change
    pub dependency_impact: Option<DependencyImpact>,
    /// Short description of what failed (for notification bodies)
    pub failure_summary: Option<String>,
    /// Longer failure detail (truncated command output)
    pub failure_message: Option<String>,
    /// The command string that failed, if a command was at fault
    pub failure_command: Option<String>,
}

impl Outcome {
    /// The status, defaulting to failed when unset.
    ///
    /// The executor always sets a status before returning; this accessor
    /// keeps downstream consumers total.
    pub fn status(&self) -> Status {
        self.status.unwrap_or(Status::Failed)
    }

    /// First failing test result, if any.
    pub fn first_failed_test(&self) -> Option<&CommandResult> {
        self.test_results.iter().find(|r| !r.succeeded())
    }

    /// First failing extra command result, if any.
    pub fn first_failed_extra(&self) -> Option<&CommandResult> {
        self.extra_results.iter().find(|r| !r.succeeded())
    }
}

/// A pull request as returned by the broker.
///
/// `labels` is a fresh allocation holding the merged label set; it never
/// aliases work-item or default label storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Web URL of the PR
    pub url: String,
    /// PR number (0 for dry-run stubs)
    pub number: u64,
    /// Repository the PR lives in
    pub repo: RepoSlug,
    /// Merged label set in application order
    pub labels: Vec<String>,
}
