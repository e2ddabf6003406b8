//! core::config::schema
//!
//! Manifest schema types.
//!
//! # Manifest
//!
//! One TOML file describes a fan-out run: shared defaults plus the list of
//! dependent repositories. Located at (in order of precedence):
//! 1. `--manifest <path>` on the command line
//! 2. `$CASCADE_MANIFEST` if set
//! 3. `./cascade.toml`
//!
//! # Validation
//!
//! Values are validated after parsing: repository identifiers must parse,
//! module paths must be non-empty, and listed commands must have a program.
//!
//! # Example
//!
//! ```toml
//! [defaults]
//! base_branch = "main"
//! commit_template = "chore: bump {{ module }} to {{ version }}"
//! timeout_secs = 300
//!
//! [defaults.pr]
//! labels = ["automation:cascade"]
//!
//! [defaults.notifications.github_issues]
//! enabled = true
//! labels = ["cascade-failure"]
//!
//! [[dependents]]
//! repo = "acme/svc"
//! module = "github.com/acme/svc"
//! tests = [["go", "test", "./..."]]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{CommandSpec, NotificationConfig, PrConfig, RepoSlug};

/// The full manifest: defaults plus dependents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Shared defaults applied to every dependent
    pub defaults: Defaults,

    /// Dependent repositories, in fan-out order
    pub dependents: Vec<Dependent>,
}

impl Manifest {
    /// Validate the manifest values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, dep) in self.dependents.iter().enumerate() {
            dep.validate()
                .map_err(|e| ConfigError::InvalidValue(format!("dependents[{}]: {}", i, e)))?;
        }
        Ok(())
    }
}

/// Shared defaults for every dependent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Base branch for worktrees (None = repository default branch)
    pub base_branch: Option<String>,

    /// Commit message template (`{{ module }}`, `{{ version }}`)
    pub commit_template: Option<String>,

    /// Per-command deadline in seconds
    pub timeout_secs: Option<u64>,

    /// Go binary to invoke (default "go"; override for toolchain wrappers)
    pub go_binary: Option<String>,

    /// PR rendering defaults
    pub pr: PrConfig,

    /// Notification routing defaults
    pub notifications: NotificationConfig,
}

/// One dependent repository entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Dependent {
    /// Repository identifier (`owner/name` or URL)
    pub repo: String,

    /// Module path of the dependent itself
    pub module: String,

    /// Base branch override
    pub branch: Option<String>,

    /// Skip this dependent without any side effects
    pub skip: bool,

    /// Per-command deadline override in seconds
    pub timeout_secs: Option<u64>,

    /// Extra environment for tests and extra commands
    pub env: BTreeMap<String, String>,

    /// Test commands, run in order
    pub tests: Vec<CommandEntry>,

    /// Extra commands (formatters, generators)
    pub extra_commands: Vec<CommandEntry>,

    /// PR override (composes over defaults)
    pub pr: Option<PrConfig>,

    /// Notification override (composes over defaults)
    pub notifications: Option<NotificationConfig>,
}

impl Dependent {
    /// Validate one dependent entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        RepoSlug::parse(&self.repo).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        if self.module.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "module must not be empty".to_string(),
            ));
        }
        for entry in self.tests.iter().chain(self.extra_commands.iter()) {
            if entry.as_spec().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "command entries must have a program".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A command in the manifest: either a bare argv array or a table with a
/// working directory.
///
/// ```toml
/// tests = [
///     ["go", "test", "./..."],
///     { argv = ["make", "check"], dir = "sub" },
/// ]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CommandEntry {
    /// Bare argv array
    Argv(Vec<String>),
    /// Full form with optional working directory
    Full(CommandSpec),
}

impl CommandEntry {
    /// Convert to the executable form.
    pub fn as_spec(&self) -> CommandSpec {
        match self {
            CommandEntry::Argv(argv) => CommandSpec {
                argv: argv.clone(),
                dir: None,
            },
            CommandEntry::Full(spec) => spec.clone(),
        }
    }
}
