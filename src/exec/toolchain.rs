//! exec::toolchain
//!
//! Module-graph mutation: update one dependency, then reconcile go.mod.
//!
//! # Design
//!
//! The toolchain surface is a trait so the executor can be tested without
//! a Go installation or network access. The production implementation
//! shells out to `go get` and `go mod tidy` through the command runner,
//! inheriting its deadline and cancellation semantics.
//!
//! Failure of either operation is always fatal to the work item.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::types::CommandSpec;
use crate::exec::command::{CommandError, CommandRunner};

/// Errors from toolchain operations.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// `go get` failed.
    #[error("go get {module}{} failed: {output}", fmt_version(.version))]
    Get {
        /// Module being updated
        module: String,
        /// Requested version ("" = latest)
        version: String,
        /// Trimmed combined output
        output: String,
    },

    /// `go mod tidy` failed.
    #[error("go mod tidy failed: {output}")]
    Tidy {
        /// Trimmed combined output
        output: String,
    },

    /// The toolchain subprocess was cut short by cancellation or deadline.
    #[error("go {operation} timed out or was canceled")]
    Interrupted {
        /// The subcommand that was interrupted
        operation: String,
    },
}

fn fmt_version(version: &str) -> String {
    if version.is_empty() {
        String::new()
    } else {
        format!("@{}", version)
    }
}

/// Capability to mutate a repository's module graph.
#[async_trait]
pub trait ToolchainOps: Send + Sync {
    /// Update `module` to `version` in the repository at `repo_path`.
    ///
    /// An empty version or `"latest"` means no version pin.
    async fn get(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
        module: &str,
        version: &str,
    ) -> Result<(), ToolchainError>;

    /// Reconcile the module graph after a change.
    async fn tidy(&self, cancel: &CancellationToken, repo_path: &Path)
        -> Result<(), ToolchainError>;
}

/// Production toolchain: shells out to the `go` binary.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    runner: CommandRunner,
    go_binary: String,
}

impl Default for GoToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl GoToolchain {
    /// Create a toolchain using `go` on `PATH`.
    pub fn new() -> Self {
        Self::with_binary("go")
    }

    /// Create a toolchain with a custom binary (wrappers, hermetic builds).
    pub fn with_binary(go_binary: impl Into<String>) -> Self {
        Self {
            runner: CommandRunner::new(),
            go_binary: go_binary.into(),
        }
    }

    async fn run(&self, cancel: &CancellationToken, repo_path: &Path, args: &[&str]) -> RunOutcome {
        let mut argv = vec![self.go_binary.clone()];
        argv.extend(args.iter().map(|s| s.to_string()));
        let spec = CommandSpec { argv, dir: None };

        match self
            .runner
            .run(cancel, repo_path, &spec, &BTreeMap::new(), None)
            .await
        {
            Ok(_) => RunOutcome::Ok,
            Err(CommandError::Interrupted(_)) => RunOutcome::Interrupted {
                operation: args[0].to_string(),
            },
            Err(e) => {
                let output = e
                    .into_command_result()
                    .map(|r| {
                        let trimmed = r.output.trim_end().to_string();
                        if trimmed.is_empty() {
                            r.error.unwrap_or_default()
                        } else {
                            trimmed
                        }
                    })
                    .unwrap_or_default();
                RunOutcome::Failed { output }
            }
        }
    }
}

/// Internal result of one toolchain subprocess.
enum RunOutcome {
    Ok,
    Interrupted { operation: String },
    Failed { output: String },
}

#[async_trait]
impl ToolchainOps for GoToolchain {
    async fn get(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
        module: &str,
        version: &str,
    ) -> Result<(), ToolchainError> {
        let pinned = !version.is_empty() && version != "latest";
        let spec = if pinned {
            format!("{}@{}", module, version)
        } else {
            module.to_string()
        };

        log::debug!("go get module={} version={}", module, version);
        match self.run(cancel, repo_path, &["get", &spec]).await {
            RunOutcome::Ok => Ok(()),
            RunOutcome::Interrupted { operation } => Err(ToolchainError::Interrupted { operation }),
            RunOutcome::Failed { output } => Err(ToolchainError::Get {
                module: module.to_string(),
                version: if pinned {
                    version.to_string()
                } else {
                    String::new()
                },
                output,
            }),
        }
    }

    async fn tidy(
        &self,
        cancel: &CancellationToken,
        repo_path: &Path,
    ) -> Result<(), ToolchainError> {
        log::debug!("go mod tidy dir={}", repo_path.display());
        match self.run(cancel, repo_path, &["mod", "tidy"]).await {
            RunOutcome::Ok => Ok(()),
            RunOutcome::Interrupted { operation } => Err(ToolchainError::Interrupted { operation }),
            RunOutcome::Failed { output } => Err(ToolchainError::Tidy { output }),
        }
    }
}
