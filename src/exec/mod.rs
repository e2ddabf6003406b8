//! exec
//!
//! The execution pipeline: subprocess control, the Git surface, the Go
//! toolchain, the dependency inspector, and the work-item state machine.
//!
//! # Modules
//!
//! - [`command`]: Deadline- and cancellation-aware subprocess runner
//! - [`git`]: Clone/worktree/commit/push over an injectable runner
//! - [`toolchain`]: `go get` and `go mod tidy`
//! - [`modfile`]: Advisory go.mod version inspection
//! - [`worker`]: The per-item state machine producing an [`crate::core::types::Outcome`]
//! - [`mock`]: Scripted doubles for the git and toolchain seams
//!
//! Every operation takes a `CancellationToken` as its first parameter;
//! cancellation propagates into subprocess kills and deadline waits.

pub mod command;
pub mod git;
pub mod mock;
pub mod modfile;
pub mod toolchain;
pub mod worker;

pub use command::{CommandError, CommandRunner};
pub use git::{GitCommandRunner, GitError, GitSurface, SystemGitRunner};
pub use toolchain::{GoToolchain, ToolchainError, ToolchainOps};
pub use worker::Executor;
