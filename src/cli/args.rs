//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! - `--manifest <path>`: Manifest file (default: `$CASCADE_MANIFEST`,
//!   then `./cascade.toml`)
//! - `--workspace <path>`: Clone workspace (default: platform cache dir)
//! - `--debug`: Enable debug logging

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cascade - fan a Go module version bump out across dependent repositories
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Manifest file describing dependents and defaults
    #[arg(long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Workspace directory for clones
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the work items a run would execute, without executing
    Plan {
        /// Module path to bump (e.g. github.com/acme/lib)
        #[arg(long)]
        module: String,

        /// Version to bump to ("latest" or empty = no pin)
        #[arg(long, default_value = "latest")]
        version: String,
    },

    /// Execute the fan-out: update, test, push, and open PRs
    Run {
        /// Module path to bump (e.g. github.com/acme/lib)
        #[arg(long)]
        module: String,

        /// Version to bump to ("latest" or empty = no pin)
        #[arg(long, default_value = "latest")]
        version: String,

        /// Plan and report without executing or touching the network
        #[arg(long)]
        dry_run: bool,

        /// Concurrent repository workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },

    /// Validate the GitHub token and rate-limit budget
    Check,
}
