//! core::config
//!
//! Manifest schema and loading.
//!
//! # Overview
//!
//! A run is configured by a single manifest file plus command-line flags.
//! The manifest carries shared defaults and the dependent list; flags carry
//! the target module/version, workspace, and run mode.
//!
//! # Manifest Locations
//!
//! Searched in order:
//! 1. `--manifest <path>` (explicit)
//! 2. `$CASCADE_MANIFEST` if set
//! 3. `./cascade.toml`
//!
//! # Example
//!
//! ```no_run
//! use cascade::core::config::load_manifest;
//!
//! let manifest = load_manifest(None).unwrap();
//! for dep in &manifest.dependents {
//!     println!("{} ({})", dep.repo, dep.module);
//! }
//! ```

pub mod schema;

pub use schema::{CommandEntry, Defaults, Dependent, Manifest};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit manifest path.
const MANIFEST_ENV: &str = "CASCADE_MANIFEST";

/// Default manifest file name in the working directory.
const MANIFEST_FILE: &str = "cascade.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read manifest '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid manifest value: {0}")]
    InvalidValue(String),

    #[error("no manifest found (looked for --manifest, ${}, ./{})", MANIFEST_ENV, MANIFEST_FILE)]
    NotFound,
}

/// Resolve the manifest path from the explicit flag, environment, or cwd.
pub fn resolve_manifest_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(from_env) = std::env::var(MANIFEST_ENV) {
        if !from_env.trim().is_empty() {
            return Ok(PathBuf::from(from_env));
        }
    }
    let local = PathBuf::from(MANIFEST_FILE);
    if local.exists() {
        return Ok(local);
    }
    Err(ConfigError::NotFound)
}

/// Load and validate a manifest.
///
/// # Errors
///
/// - `ConfigError::NotFound` when no path resolves
/// - `ConfigError::ReadError` / `ParseError` for I/O and TOML problems
/// - `ConfigError::InvalidValue` when validation rejects an entry
pub fn load_manifest(explicit: Option<&Path>) -> Result<Manifest, ConfigError> {
    let path = resolve_manifest_path(explicit)?;
    load_manifest_file(&path)
}

/// Load and validate a manifest from a concrete path.
pub fn load_manifest_file(path: &Path) -> Result<Manifest, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest: Manifest = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    manifest.validate()?;
    Ok(manifest)
}

/// Default workspace directory for clones.
///
/// `~/.cache/cascade/workspace` (per-platform cache dir), falling back to
/// `.cascade-workspace` under the current directory when no cache dir is
/// known.
pub fn default_workspace() -> PathBuf {
    match dirs::cache_dir() {
        Some(cache) => cache.join("cascade").join("workspace"),
        None => PathBuf::from(".cascade-workspace"),
    }
}
