//! exec::mock
//!
//! Scripted doubles for the execution seams.
//!
//! # Design
//!
//! [`MockGit`] implements [`GitCommandRunner`] with responses scripted per
//! git subcommand and every call recorded, so tests can drive the full
//! surface (clone verification, worktree materialization, commit, push)
//! without a repository. [`MockToolchain`] implements [`ToolchainOps`] the
//! same way for `get`/`tidy`.
//!
//! # Example
//!
//! ```
//! use cascade::exec::git::GitCommandRunner;
//! use cascade::exec::mock::MockGit;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let git = MockGit::new();
//! git.script("rev-parse", Ok("deadbeef".to_string()));
//!
//! let cancel = CancellationToken::new();
//! let out = git
//!     .run_git(&cancel, std::path::Path::new("."), &["rev-parse", "HEAD"])
//!     .await
//!     .unwrap();
//! assert_eq!(out, "deadbeef");
//! assert_eq!(git.calls_for("rev-parse").len(), 1);
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::exec::git::{GitCommandRunner, GitError};
use crate::exec::toolchain::{ToolchainError, ToolchainOps};

/// One recorded git invocation.
#[derive(Debug, Clone)]
pub struct RecordedGitCall {
    /// Directory the command ran in
    pub dir: PathBuf,
    /// Full argument vector
    pub args: Vec<String>,
}

#[derive(Debug, Default)]
struct MockGitInner {
    /// Scripted responses keyed by git subcommand, popped in order.
    responses: HashMap<String, VecDeque<Result<String, GitError>>>,
    /// Recorded invocations in order.
    calls: Vec<RecordedGitCall>,
}

/// Scripted git runner.
///
/// Unscripted subcommands succeed with empty output, which models the many
/// quiet git operations (`fetch`, `add`, `worktree add`) without per-test
/// boilerplate. Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone, Default)]
pub struct MockGit {
    inner: Arc<Mutex<MockGitInner>>,
}

impl MockGit {
    /// Create a mock where every call succeeds with empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a git subcommand (`clone`, `status`, ...).
    ///
    /// Responses queue per subcommand and are consumed in order; when the
    /// queue is empty the call falls back to `Ok("")`.
    pub fn script(&self, subcommand: &str, response: Result<String, GitError>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .responses
            .entry(subcommand.to_string())
            .or_default()
            .push_back(response);
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<RecordedGitCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Recorded invocations of one subcommand.
    pub fn calls_for(&self, subcommand: &str) -> Vec<RecordedGitCall> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.args.first().map(String::as_str) == Some(subcommand))
            .cloned()
            .collect()
    }

    /// Whether any invocation of a subcommand was recorded.
    pub fn was_called(&self, subcommand: &str) -> bool {
        !self.calls_for(subcommand).is_empty()
    }
}

#[async_trait]
impl GitCommandRunner for MockGit {
    async fn run_git(
        &self,
        _cancel: &CancellationToken,
        dir: &Path,
        args: &[&str],
    ) -> Result<String, GitError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedGitCall {
            dir: dir.to_path_buf(),
            args: args.iter().map(|s| s.to_string()).collect(),
        });

        let key = args.first().copied().unwrap_or_default();
        match inner.responses.get_mut(key).and_then(VecDeque::pop_front) {
            Some(response) => response,
            None => Ok(String::new()),
        }
    }
}

/// One recorded toolchain invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainCall {
    /// `get(module, version)` in a directory
    Get {
        dir: PathBuf,
        module: String,
        version: String,
    },
    /// `tidy()` in a directory
    Tidy { dir: PathBuf },
}

#[derive(Debug, Default)]
struct MockToolchainInner {
    calls: Vec<ToolchainCall>,
    fail_get: Option<String>,
    fail_tidy: Option<String>,
}

/// Scripted toolchain.
///
/// Succeeds by default; `fail_get` / `fail_tidy` inject one-shot failures
/// carrying the given output.
#[derive(Debug, Clone, Default)]
pub struct MockToolchain {
    inner: Arc<Mutex<MockToolchainInner>>,
}

impl MockToolchain {
    /// Create a toolchain where both operations succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `get` fail with the given output.
    pub fn fail_get(&self, output: impl Into<String>) {
        self.inner.lock().unwrap().fail_get = Some(output.into());
    }

    /// Make the next `tidy` fail with the given output.
    pub fn fail_tidy(&self, output: impl Into<String>) {
        self.inner.lock().unwrap().fail_tidy = Some(output.into());
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<ToolchainCall> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ToolchainOps for MockToolchain {
    async fn get(
        &self,
        _cancel: &CancellationToken,
        repo_path: &Path,
        module: &str,
        version: &str,
    ) -> Result<(), ToolchainError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ToolchainCall::Get {
            dir: repo_path.to_path_buf(),
            module: module.to_string(),
            version: version.to_string(),
        });
        match inner.fail_get.take() {
            Some(output) => Err(ToolchainError::Get {
                module: module.to_string(),
                version: version.to_string(),
                output,
            }),
            None => Ok(()),
        }
    }

    async fn tidy(
        &self,
        _cancel: &CancellationToken,
        repo_path: &Path,
    ) -> Result<(), ToolchainError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ToolchainCall::Tidy {
            dir: repo_path.to_path_buf(),
        });
        match inner.fail_tidy.take() {
            Some(output) => Err(ToolchainError::Tidy { output }),
            None => Ok(()),
        }
    }
}
