//! exec::git
//!
//! Git surface: idempotent clone, per-branch worktrees, commit, push.
//!
//! This module is the single doorway to Git for the execution pipeline.
//! It drives the `git` CLI rather than a library binding: worktree
//! management and cancellable long-running operations (clone, fetch) are
//! only reliable through the CLI, and the CLI is Git's one stable API.
//!
//! # Injection
//!
//! All operations run through a [`GitCommandRunner`], the sole seam for
//! tests. The production implementation is [`SystemGitRunner`]; scripted
//! doubles live in [`crate::exec::mock`].
//!
//! # Invariants
//!
//! Git output lines are trimmed of trailing whitespace before comparison:
//! commit hashes, branch names, and remote URLs all carry a trailing
//! newline on the wire.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Deadline for a single git subprocess.
const GIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Subdirectory of a clone that holds per-branch worktrees.
const WORKTREES_DIR: &str = ".worktrees";

/// Errors from Git operations.
///
/// [`GitError::NoChanges`] is a sentinel, not a failure: `commit` raises it
/// for a clean working tree and the executor maps it to a completed
/// outcome.
#[derive(Debug, Error)]
pub enum GitError {
    /// A git subprocess exited non-zero.
    #[error("git {operation} failed in {}: {detail}", .dir.display())]
    Command {
        /// The git subcommand (e.g. `clone`, `push`)
        operation: String,
        /// Full argument vector for forensics
        args: Vec<String>,
        /// Directory the command ran in
        dir: PathBuf,
        /// Trimmed combined output
        detail: String,
    },

    /// A git subprocess was cut short by cancellation or its deadline.
    #[error("git {operation} timed out or was canceled")]
    Interrupted {
        /// The git subcommand that was interrupted
        operation: String,
    },

    /// The working tree had nothing to commit.
    #[error("no changes to commit")]
    NoChanges,

    /// A clone destination exists but tracks a different repository.
    #[error("clone destination {} tracks {actual}, expected {expected}", .path.display())]
    InvalidRepo {
        /// The existing clone path
        path: PathBuf,
        /// Normalized URL the work item wanted
        expected: String,
        /// Normalized URL the clone actually tracks
        actual: String,
    },

    /// An existing worktree is checked out on the wrong branch.
    #[error("worktree {} is on branch '{actual}', expected '{expected}'", .path.display())]
    WorktreeBranchMismatch {
        /// The worktree path
        path: PathBuf,
        /// Branch the caller asked for
        expected: String,
        /// Branch the worktree is on
        actual: String,
    },

    /// Filesystem problem around the workspace.
    #[error("workspace error at {}: {source}", .path.display())]
    Io {
        /// The path involved
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Capability to run one git command and return its stdout.
///
/// The sole injection seam for the Git surface. Implementations return
/// stdout with trailing whitespace trimmed; a non-zero exit becomes
/// [`GitError::Command`].
#[async_trait]
pub trait GitCommandRunner: Send + Sync {
    /// Run `git <args>` in `dir` and return trimmed stdout.
    async fn run_git(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        args: &[&str],
    ) -> Result<String, GitError>;
}

/// Production runner: spawns the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemGitRunner;

impl SystemGitRunner {
    /// Create a runner using the `git` on `PATH`.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitCommandRunner for SystemGitRunner {
    async fn run_git(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        args: &[&str],
    ) -> Result<String, GitError> {
        let operation = args.first().copied().unwrap_or("git").to_string();

        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| GitError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let stdout_pipe = child.stdout.take().expect("stdout was piped");
        let stderr_pipe = child.stderr.take().expect("stderr was piped");
        let (stdout_task, stdout_buf) = crate::exec::command::drain(stdout_pipe);
        let (stderr_task, stderr_buf) = crate::exec::command::drain(stderr_pipe);

        let status = tokio::select! {
            status = child.wait() => Some(status.ok()),
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep(GIT_TIMEOUT) => None,
        };
        let status = match status {
            Some(status) => status,
            None => {
                let _ = child.kill().await;
                return Err(GitError::Interrupted { operation });
            }
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let stdout = String::from_utf8_lossy(&stdout_buf.lock().unwrap()).into_owned();

        match status {
            Some(s) if s.success() => Ok(stdout.trim_end().to_string()),
            _ => {
                let mut detail = String::from_utf8_lossy(&stderr_buf.lock().unwrap())
                    .trim_end()
                    .to_string();
                if detail.is_empty() {
                    detail = stdout.trim_end().to_string();
                }
                Err(GitError::Command {
                    operation,
                    args: args.iter().map(|s| s.to_string()).collect(),
                    dir: dir.to_path_buf(),
                    detail,
                })
            }
        }
    }
}

/// The Git surface used by the executor.
///
/// Parameterized by the command runner so tests can script every git
/// interaction without touching a repository.
#[derive(Debug, Clone)]
pub struct GitSurface<R: GitCommandRunner> {
    runner: R,
}

impl<R: GitCommandRunner> GitSurface<R> {
    /// Wrap a command runner.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Access the underlying runner (used by tests to inspect recorded calls).
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Ensure `workspace/<repo_name>` is a clone of `repo`.
    ///
    /// Idempotent: an existing clone is verified against the requested
    /// repository by normalized remote URL and reused. A destination that
    /// tracks a different repository is a fatal [`GitError::InvalidRepo`].
    ///
    /// `repo` accepts `owner/name` shorthand (expanded to
    /// `https://github.com/owner/name`), full URLs, and `git@` forms.
    pub async fn ensure_clone(
        &self,
        cancel: &CancellationToken,
        repo: &str,
        workspace: &Path,
    ) -> Result<PathBuf, GitError> {
        let repo_name = repo_dir_name(repo);
        let repo_path = workspace.join(&repo_name);

        if repo_path.join(".git").exists() {
            let origin = self
                .runner
                .run_git(cancel, &repo_path, &["remote", "get-url", "origin"])
                .await?;
            let expected = normalize_remote_url(&clone_url(repo));
            let actual = normalize_remote_url(origin.trim());
            if expected != actual {
                return Err(GitError::InvalidRepo {
                    path: repo_path,
                    expected,
                    actual,
                });
            }
            log::debug!("reusing existing clone repo={} path={}", repo, repo_path.display());
            return Ok(repo_path);
        }

        std::fs::create_dir_all(workspace).map_err(|source| GitError::Io {
            path: workspace.to_path_buf(),
            source,
        })?;

        let url = clone_url(repo);
        let path_str = repo_path.to_string_lossy().into_owned();
        log::info!("cloning repo={} url={} path={}", repo, url, path_str);
        self.runner
            .run_git(cancel, workspace, &["clone", &url, &path_str])
            .await?;
        Ok(repo_path)
    }

    /// Ensure a worktree for `branch` exists under the clone.
    ///
    /// The worktree lives at `<repo_path>/.worktrees/<branch>`. An existing
    /// worktree is verified to be on the requested branch; a mismatch is
    /// fatal. Otherwise the branch is materialized from, in order: the
    /// local branch, the remote branch (as a tracking branch), or a new
    /// branch cut from `base` (falling back to the repository's default
    /// branch).
    pub async fn ensure_worktree(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<PathBuf, GitError> {
        self.runner
            .run_git(cancel, repo_path, &["fetch", "origin"])
            .await?;

        let worktree_path = repo_path.join(WORKTREES_DIR).join(branch);
        if worktree_path.exists() {
            let head = self
                .runner
                .run_git(cancel, &worktree_path, &["rev-parse", "--abbrev-ref", "HEAD"])
                .await?;
            let actual = head.trim();
            if actual != branch {
                return Err(GitError::WorktreeBranchMismatch {
                    path: worktree_path,
                    expected: branch.to_string(),
                    actual: actual.to_string(),
                });
            }
            log::debug!("reusing worktree branch={} path={}", branch, worktree_path.display());
            return Ok(worktree_path);
        }

        let path_str = worktree_path.to_string_lossy().into_owned();
        let local_ref = format!("refs/heads/{}", branch);
        let remote_ref = format!("refs/remotes/origin/{}", branch);

        if self.ref_exists(cancel, repo_path, &local_ref).await? {
            self.runner
                .run_git(cancel, repo_path, &["worktree", "add", &path_str, branch])
                .await?;
        } else if self.ref_exists(cancel, repo_path, &remote_ref).await? {
            let tracking = format!("origin/{}", branch);
            self.runner
                .run_git(
                    cancel,
                    repo_path,
                    &["worktree", "add", "--track", "-b", branch, &path_str, &tracking],
                )
                .await?;
        } else {
            let base = match base {
                Some(base) if !base.is_empty() => base.to_string(),
                _ => self.default_branch(cancel, repo_path).await?,
            };
            let base_ref = format!("refs/remotes/origin/{}", base);
            let start_point = if self.ref_exists(cancel, repo_path, &base_ref).await? {
                format!("origin/{}", base)
            } else {
                base
            };
            self.runner
                .run_git(
                    cancel,
                    repo_path,
                    &["worktree", "add", "-b", branch, &path_str, &start_point],
                )
                .await?;
        }

        log::info!("created worktree branch={} path={}", branch, worktree_path.display());
        Ok(worktree_path)
    }

    /// Stage everything and commit, returning the new `HEAD` hash.
    ///
    /// A clean working tree raises [`GitError::NoChanges`]; callers treat
    /// that as success with nothing to do.
    pub async fn commit(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
        message: &str,
    ) -> Result<String, GitError> {
        self.runner
            .run_git(cancel, repo_path, &["add", "."])
            .await?;

        let status = self
            .runner
            .run_git(cancel, repo_path, &["status", "--porcelain"])
            .await?;
        if status.trim().is_empty() {
            return Err(GitError::NoChanges);
        }

        self.runner
            .run_git(cancel, repo_path, &["commit", "-m", message])
            .await?;

        let hash = self
            .runner
            .run_git(cancel, repo_path, &["rev-parse", "HEAD"])
            .await?;
        Ok(hash.trim().to_string())
    }

    /// Push `branch` to `origin`.
    ///
    /// Push failures are not retried here; policy belongs to callers.
    pub async fn push(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        self.runner
            .run_git(cancel, repo_path, &["push", "origin", branch])
            .await?;
        Ok(())
    }

    /// Whether a fully-qualified ref exists.
    async fn ref_exists(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
        full_ref: &str,
    ) -> Result<bool, GitError> {
        let out = self
            .runner
            .run_git(
                cancel,
                repo_path,
                &["for-each-ref", "--format=%(refname)", full_ref],
            )
            .await?;
        Ok(!out.trim().is_empty())
    }

    /// Discover the repository's default branch.
    ///
    /// Tries `symbolic-ref refs/remotes/origin/HEAD`, then falls back to
    /// `main` and `master` by remote-ref existence, then to `main`.
    async fn default_branch(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
    ) -> Result<String, GitError> {
        if let Ok(head) = self
            .runner
            .run_git(cancel, repo_path, &["symbolic-ref", "refs/remotes/origin/HEAD"])
            .await
        {
            if let Some(branch) = head.trim().strip_prefix("refs/remotes/origin/") {
                if !branch.is_empty() {
                    return Ok(branch.to_string());
                }
            }
        }

        for candidate in ["main", "master"] {
            let full_ref = format!("refs/remotes/origin/{}", candidate);
            if self.ref_exists(cancel, repo_path, &full_ref).await? {
                return Ok(candidate.to_string());
            }
        }

        Ok("main".to_string())
    }
}

/// Derive the clone directory name from a repository identifier.
///
/// The trailing path segment, with any `.git` suffix stripped.
pub fn repo_dir_name(repo: &str) -> String {
    let trimmed = repo.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Expand a repository identifier into a cloneable URL.
///
/// `owner/name` shorthand becomes `https://github.com/owner/name`; full
/// URLs, `git@` forms, and filesystem paths pass through untouched.
pub fn clone_url(repo: &str) -> String {
    let passthrough = repo.contains("://")
        || repo.starts_with("git@")
        || repo.starts_with('/')
        || repo.starts_with('.');
    if passthrough {
        repo.to_string()
    } else {
        format!("https://github.com/{}", repo)
    }
}

/// Normalize a remote URL for equality comparison.
///
/// Strips a `.git` suffix, rewrites `git@host:owner/name` to
/// `https://host/owner/name`, and lowercases the result.
pub fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    let url = url.strip_suffix(".git").unwrap_or(url);
    let rewritten = match url.strip_prefix("git@") {
        Some(rest) => match rest.split_once(':') {
            Some((host, path)) => format!("https://{}/{}", host, path),
            None => url.to_string(),
        },
        None => url.to_string(),
    };
    rewritten.to_lowercase()
}
