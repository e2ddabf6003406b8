//! Cascade - fan a Go module version bump out across dependent repositories
//!
//! Given a target (module path + version) and a manifest enumerating
//! dependent repositories with their hooks, cascade plans the work items,
//! executes each one in an isolated workspace (clone, branch, update the
//! dependency, tidy, run tests, commit, push), opens or updates a pull
//! request, and delivers notifications about success or failure.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, drives the run)
//! - [`core`] - Domain types, manifest schema, naming rules, the planner
//! - [`exec`] - The execution pipeline: subprocess control, the Git
//!   surface, the Go toolchain, and the per-item state machine
//! - [`github`] - Credential discovery and the PR/issue provider
//! - [`broker`] - Post-execution fan-out: PR upsert and notifications
//!
//! # Correctness Invariants
//!
//! 1. A skipped work item performs zero filesystem and network operations
//! 2. A completed outcome carries a commit hash or the no-changes reason
//! 3. A manual-review outcome means tests passed and the branch is pushed
//! 4. Dependency version detection is advisory and never fails a run

pub mod broker;
pub mod cli;
pub mod core;
pub mod exec;
pub mod github;
