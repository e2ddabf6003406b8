//! exec::worker
//!
//! The work-item executor: a state machine driving clone, worktree,
//! dependency update, tests, commit, and push for one dependent.
//!
//! # Lifecycle
//!
//! ```text
//! Validate -> Clone -> Worktree -> Get -> Tidy -> Tests -> Extras -> Commit -> Push
//! ```
//!
//! Each phase may short-circuit to a terminal status. Tests failing is
//! always fatal; extra commands failing downgrades the outcome to
//! manual-review (the branch is still pushed so a human can inspect it);
//! a clean working tree at commit time completes the item as a no-op.
//!
//! # Invariants
//!
//! - A skipped item performs zero filesystem and network operations.
//! - `completed` implies a commit hash or the no-changes reason.
//! - `manual-review` implies all tests passed and a commit was pushed.
//! - The dependency inspector is advisory: its parse errors land in
//!   `DependencyImpact::notes`, never in the status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::types::{
    CommandResult, CommandSpec, DependencyImpact, Outcome, Status, Target, ValidationError,
    WorkItem,
};
use crate::exec::command::{CommandError, CommandRunner};
use crate::exec::git::{GitCommandRunner, GitError, GitSurface};
use crate::exec::modfile;
use crate::exec::toolchain::{ToolchainError, ToolchainOps};

/// Deadline for a single test or extra command when the item sets none.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Cap on output carried into `failure_message`.
const FAILURE_EXCERPT_LEN: usize = 1000;

/// Drives one work item through the execution pipeline.
///
/// The executor owns its seams: a git surface (parameterized by the
/// injectable git command runner), a toolchain, and the command runner for
/// user-supplied tests. None of them reach back; the dependency graph is a
/// tree.
pub struct Executor<R: GitCommandRunner, T: ToolchainOps> {
    git: GitSurface<R>,
    toolchain: T,
    runner: CommandRunner,
    workspace: PathBuf,
}

impl<R: GitCommandRunner, T: ToolchainOps> Executor<R, T> {
    /// Create an executor over a workspace directory.
    pub fn new(git: GitSurface<R>, toolchain: T, runner: CommandRunner, workspace: PathBuf) -> Self {
        Self {
            git,
            toolchain,
            runner,
            workspace,
        }
    }

    /// Execute one work item to a terminal outcome.
    ///
    /// Never panics and never returns early without a status: every error
    /// is folded into the outcome so the broker can report it.
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        item: &WorkItem,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        if let Err(e) = self.validate(target, item) {
            outcome.status = Some(Status::Failed);
            outcome.reason = format!("validation failed: {}", e);
            outcome.failure_summary = Some("validation failed".to_string());
            outcome.failure_message = Some(e.to_string());
            log::warn!(
                "executor: rejected repo={} branch={}: {}",
                item.repo,
                item.branch_name,
                outcome.reason
            );
            return outcome;
        }

        if item.skip {
            outcome.status = Some(Status::Skipped);
            outcome.reason = "skip flag set in manifest".to_string();
            log::info!("executor: phase=skip repo={} module={}", item.repo, target.module);
            return outcome;
        }

        let mut impact = DependencyImpact::new(&target.module, &target.version);
        self.run_pipeline(cancel, target, item, &mut outcome, &mut impact)
            .await;
        outcome.dependency_impact = Some(impact);

        log::info!(
            "executor: done repo={} branch={} module={} version={} status={} reason={}",
            item.repo,
            item.branch_name,
            target.module,
            target.version,
            outcome.status(),
            outcome.reason
        );
        outcome
    }

    /// Reject inputs that cannot produce a meaningful run.
    fn validate(&self, target: &Target, item: &WorkItem) -> Result<(), ValidationError> {
        if target.module.trim().is_empty() {
            return Err(ValidationError::Empty { field: "module" });
        }
        if item.module.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "dependent module",
            });
        }
        if item.branch_name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "branch name",
            });
        }
        if item.commit_message.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "commit message",
            });
        }
        if self.workspace.as_os_str().is_empty() {
            return Err(ValidationError::Empty { field: "workspace" });
        }
        Ok(())
    }

    async fn run_pipeline(
        &self,
        cancel: &CancellationToken,
        target: &Target,
        item: &WorkItem,
        outcome: &mut Outcome,
        impact: &mut DependencyImpact,
    ) {
        let repo = item.repo.to_string();

        // Clone
        self.log_phase("clone", item, target);
        let repo_path = match self.git.ensure_clone(cancel, &repo, &self.workspace).await {
            Ok(path) => path,
            Err(e) => return fail_git(outcome, "git clone", e),
        };

        // Worktree
        self.log_phase("worktree", item, target);
        let worktree = match self
            .git
            .ensure_worktree(
                cancel,
                &repo_path,
                &item.branch_name,
                item.base_branch.as_deref(),
            )
            .await
        {
            Ok(path) => path,
            Err(e) => return fail_git(outcome, "git worktree", e),
        };

        // Get (with advisory version capture around it)
        modfile::capture_old(impact, &worktree);
        self.log_phase("update", item, target);
        if let Err(e) = self
            .toolchain
            .get(cancel, &worktree, &target.module, &target.version)
            .await
        {
            return fail_toolchain(outcome, "dependency update", e);
        }
        modfile::capture_new(impact, &worktree, "after update");

        // Tidy
        self.log_phase("tidy", item, target);
        if let Err(e) = self.toolchain.tidy(cancel, &worktree).await {
            return fail_toolchain(outcome, "module tidy", e);
        }
        modfile::capture_new(impact, &worktree, "after tidy");

        // Tests, then extras. Extras run even when tests failed so their
        // results are on record, but a test failure is always fatal.
        self.log_phase("tests", item, target);
        let tests = self.run_commands(cancel, &worktree, item, &item.tests).await;
        outcome.test_results = tests.results;

        self.log_phase("extra-commands", item, target);
        let extras = self
            .run_commands(cancel, &worktree, item, &item.extra_commands)
            .await;
        outcome.extra_results = extras.results;

        if let Some(failure) = tests.failure {
            outcome.status = Some(Status::Failed);
            outcome.reason = if failure.interrupted {
                "tests timed out or was canceled".to_string()
            } else {
                format!("tests failed: {}", failure.detail)
            };
            outcome.failure_summary = Some("tests failed".to_string());
            outcome.failure_message = Some(failure.excerpt);
            outcome.failure_command = failure.command;
            return;
        }

        // Commit
        self.log_phase("commit", item, target);
        match self.git.commit(cancel, &worktree, &item.commit_message).await {
            Ok(hash) => outcome.commit_hash = hash,
            Err(GitError::NoChanges) => {
                outcome.status = Some(Status::Completed);
                outcome.reason = "no changes to commit".to_string();
                return;
            }
            Err(e) => return fail_git(outcome, "git commit", e),
        }

        // Push
        self.log_phase("push", item, target);
        if let Err(e) = self.git.push(cancel, &worktree, &item.branch_name).await {
            return fail_git(outcome, "git push", e);
        }

        match extras.failure {
            Some(failure) => {
                outcome.status = Some(Status::ManualReview);
                outcome.reason =
                    format!("tests passed but extra commands failed: {}", failure.detail);
                outcome.failure_summary = Some("extra commands failed".to_string());
                outcome.failure_message = Some(failure.excerpt);
                outcome.failure_command = failure.command;
            }
            None => {
                outcome.status = Some(Status::Completed);
            }
        }
    }

    /// Run a command list in order, halting on the first failure but
    /// recording every attempted result.
    async fn run_commands(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
        item: &WorkItem,
        specs: &[CommandSpec],
    ) -> CommandBatch {
        let timeout = item.timeout.unwrap_or(DEFAULT_TEST_TIMEOUT);
        let mut batch = CommandBatch::default();

        for spec in specs {
            match self
                .runner
                .run(cancel, dir, spec, &item.env, Some(timeout))
                .await
            {
                Ok(result) => {
                    // A populated error field is a failure even when the
                    // outer call succeeded.
                    let failed = !result.succeeded();
                    if failed {
                        batch.failure = Some(CommandFailure::from_result(&result, false));
                    }
                    batch.results.push(result);
                    if failed {
                        break;
                    }
                }
                Err(CommandError::Empty) => {
                    batch.failure = Some(CommandFailure {
                        command: None,
                        detail: "empty command".to_string(),
                        excerpt: "empty command".to_string(),
                        interrupted: false,
                    });
                    break;
                }
                Err(e) => {
                    let interrupted = e.is_interrupted();
                    let detail = e.to_string();
                    if let Some(result) = e.into_command_result() {
                        batch.failure = Some(CommandFailure {
                            command: Some(result.command.to_string()),
                            detail,
                            excerpt: failure_excerpt(&result),
                            interrupted,
                        });
                        batch.results.push(result);
                    }
                    break;
                }
            }
        }

        batch
    }

    fn log_phase(&self, phase: &str, item: &WorkItem, target: &Target) {
        log::debug!(
            "executor: phase={} repo={} branch={} module={} version={}",
            phase,
            item.repo,
            item.branch_name,
            target.module,
            target.version
        );
    }
}

/// Results and first failure of one command list.
#[derive(Debug, Default)]
struct CommandBatch {
    results: Vec<CommandResult>,
    failure: Option<CommandFailure>,
}

/// Details of the first failing command in a list.
#[derive(Debug)]
struct CommandFailure {
    command: Option<String>,
    detail: String,
    excerpt: String,
    interrupted: bool,
}

impl CommandFailure {
    fn from_result(result: &CommandResult, interrupted: bool) -> Self {
        Self {
            command: Some(result.command.to_string()),
            detail: result
                .error
                .clone()
                .unwrap_or_else(|| format!("exit status {}", result.exit_code)),
            excerpt: failure_excerpt(result),
            interrupted,
        }
    }
}

/// Tail of a failed command's output, bounded for notification bodies.
fn failure_excerpt(result: &CommandResult) -> String {
    let output = result.output.trim_end();
    if output.is_empty() {
        return result.error.clone().unwrap_or_default();
    }
    let chars: Vec<char> = output.chars().collect();
    if chars.len() <= FAILURE_EXCERPT_LEN {
        output.to_string()
    } else {
        chars[chars.len() - FAILURE_EXCERPT_LEN..].iter().collect()
    }
}

fn fail_git(outcome: &mut Outcome, phase: &str, e: GitError) {
    outcome.status = Some(Status::Failed);
    outcome.reason = match &e {
        GitError::Interrupted { .. } => format!("{} timed out or was canceled", phase),
        _ => format!("{} failed: {}", phase, e),
    };
    outcome.failure_summary = Some(format!("{} failed", phase));
    outcome.failure_message = Some(e.to_string());
}

fn fail_toolchain(outcome: &mut Outcome, phase: &str, e: ToolchainError) {
    outcome.status = Some(Status::Failed);
    outcome.reason = match &e {
        ToolchainError::Interrupted { .. } => format!("{} timed out or was canceled", phase),
        _ => format!("{} failed: {}", phase, e),
    };
    outcome.failure_summary = Some(format!("{} failed", phase));
    outcome.failure_message = Some(e.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoSlug;
    use crate::exec::mock::{MockGit, MockToolchain, ToolchainCall};

    const GO_MOD: &str = "module github.com/acme/svc\n\nrequire github.com/acme/lib v1.9.0\n";

    struct Fixture {
        _tmp: tempfile::TempDir,
        workspace: PathBuf,
        git: MockGit,
        toolchain: MockToolchain,
    }

    impl Fixture {
        /// A workspace with an existing clone of acme/svc and a worktree
        /// for the given branch, so scripted runs stay on the reuse paths.
        fn with_existing_clone(branch: &str) -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let workspace = tmp.path().to_path_buf();
            let repo = workspace.join("svc");
            let worktree = repo.join(".worktrees").join(branch);
            std::fs::create_dir_all(repo.join(".git")).unwrap();
            std::fs::create_dir_all(&worktree).unwrap();
            std::fs::write(worktree.join("go.mod"), GO_MOD).unwrap();

            let git = MockGit::new();
            // ensure_clone verifies the existing clone's origin.
            git.script("remote", Ok("https://github.com/acme/svc.git".to_string()));
            // ensure_worktree verifies the existing worktree's branch.
            git.script("rev-parse", Ok(branch.to_string()));

            Self {
                _tmp: tmp,
                workspace,
                git,
                toolchain: MockToolchain::new(),
            }
        }

        fn executor(&self) -> Executor<MockGit, MockToolchain> {
            Executor::new(
                GitSurface::new(self.git.clone()),
                self.toolchain.clone(),
                CommandRunner::new(),
                self.workspace.clone(),
            )
        }
    }

    fn target() -> Target {
        Target::new("github.com/acme/lib", "v2.0.0").unwrap()
    }

    fn item(branch: &str) -> WorkItem {
        let mut item = WorkItem::new(
            RepoSlug::parse("acme/svc").unwrap(),
            "github.com/acme/svc",
            branch,
        );
        item.commit_message = "chore: bump lib".to_string();
        item
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(["sh", "-c", script])
    }

    #[tokio::test]
    async fn skipped_item_touches_nothing() {
        let fixture = Fixture::with_existing_clone("b");
        let mut work = item("b");
        work.skip = true;

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        assert_eq!(outcome.status(), Status::Skipped);
        assert!(!outcome.reason.is_empty());
        assert!(fixture.git.calls().is_empty());
        assert!(fixture.toolchain.calls().is_empty());
        assert!(outcome.dependency_impact.is_none());
    }

    #[tokio::test]
    async fn validation_rejects_empty_branch() {
        let fixture = Fixture::with_existing_clone("b");
        let work = item("");

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        assert_eq!(outcome.status(), Status::Failed);
        assert!(outcome.reason.starts_with("validation failed: "));
        assert!(outcome.reason.contains("branch name"));
        assert!(fixture.git.calls().is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_empty_commit_message() {
        let fixture = Fixture::with_existing_clone("b");
        let mut work = item("b");
        work.commit_message = String::new();

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        assert_eq!(outcome.status(), Status::Failed);
        assert!(outcome.reason.contains("commit message"));
    }

    #[tokio::test]
    async fn no_changes_completes_without_push() {
        let branch = "cascade-update-lib-v2-0-0";
        let fixture = Fixture::with_existing_clone(branch);
        // Clean working tree at commit time.
        fixture.git.script("status", Ok(String::new()));

        let mut work = item(branch);
        work.tests = vec![sh("exit 0")];

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        assert_eq!(outcome.status(), Status::Completed);
        assert_eq!(outcome.reason, "no changes to commit");
        assert_eq!(outcome.commit_hash, "");
        assert!(!fixture.git.was_called("push"));
        assert_eq!(outcome.test_results.len(), 1);
        assert!(outcome.test_results[0].succeeded());
    }

    #[tokio::test]
    async fn failing_extras_downgrade_to_manual_review() {
        let branch = "cascade-update-lib-v2-0-0";
        let fixture = Fixture::with_existing_clone(branch);
        fixture.git.script("status", Ok(" M go.mod".to_string()));
        // Second rev-parse resolves HEAD after the commit.
        fixture
            .git
            .script("rev-parse", Ok("deadbeefcafe0123".to_string()));

        let mut work = item(branch);
        work.tests = vec![sh("exit 0")];
        work.extra_commands = vec![sh("exit 1")];

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        assert_eq!(outcome.status(), Status::ManualReview);
        assert!(outcome
            .reason
            .contains("tests passed but extra commands failed"));
        assert_eq!(outcome.commit_hash, "deadbeefcafe0123");
        assert!(fixture.git.was_called("push"));
        assert_eq!(outcome.failure_command.as_deref(), Some("sh -c exit 1"));
    }

    #[tokio::test]
    async fn failing_tests_are_fatal_but_extras_still_recorded() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);

        let mut work = item(branch);
        work.tests = vec![sh("echo boom >&2; exit 2")];
        work.extra_commands = vec![sh("exit 0")];

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        assert_eq!(outcome.status(), Status::Failed);
        assert!(outcome.reason.starts_with("tests failed: "));
        assert_eq!(outcome.extra_results.len(), 1);
        assert!(outcome.extra_results[0].succeeded());
        assert!(!fixture.git.was_called("push"));
        assert!(outcome.failure_message.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_failure_halts_remaining_tests() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);

        let mut work = item(branch);
        work.tests = vec![sh("exit 0"), sh("exit 1"), sh("exit 0")];

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &work)
            .await;

        // The third test never ran.
        assert_eq!(outcome.test_results.len(), 2);
        assert_eq!(outcome.status(), Status::Failed);
    }

    #[tokio::test]
    async fn get_failure_maps_to_dependency_update_reason() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);
        fixture.toolchain.fail_get("no matching versions found");

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &item(branch))
            .await;

        assert_eq!(outcome.status(), Status::Failed);
        assert!(outcome.reason.starts_with("dependency update failed: "));
        assert!(outcome.reason.contains("no matching versions"));
        assert!(!fixture.git.was_called("push"));
    }

    #[tokio::test]
    async fn tidy_failure_maps_to_module_tidy_reason() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);
        fixture.toolchain.fail_tidy("inconsistent vendoring");

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &item(branch))
            .await;

        assert_eq!(outcome.status(), Status::Failed);
        assert!(outcome.reason.starts_with("module tidy failed: "));
    }

    #[tokio::test]
    async fn clone_mismatch_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("svc").join(".git")).unwrap();

        let git = MockGit::new();
        git.script("remote", Ok("https://github.com/other/svc.git".to_string()));
        let executor = Executor::new(
            GitSurface::new(git),
            MockToolchain::new(),
            CommandRunner::new(),
            tmp.path().to_path_buf(),
        );

        let outcome = executor
            .apply(&CancellationToken::new(), &target(), &item("b"))
            .await;

        assert_eq!(outcome.status(), Status::Failed);
        assert!(outcome.reason.starts_with("git clone failed: "));
        assert!(outcome.reason.contains("https://github.com/other/svc"));
        assert!(outcome.reason.contains("https://github.com/acme/svc"));
    }

    #[tokio::test]
    async fn toolchain_runs_in_the_worktree() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);
        fixture.git.script("status", Ok(String::new()));

        fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &item(branch))
            .await;

        let worktree = fixture.workspace.join("svc").join(".worktrees").join(branch);
        assert_eq!(
            fixture.toolchain.calls(),
            vec![
                ToolchainCall::Get {
                    dir: worktree.clone(),
                    module: "github.com/acme/lib".to_string(),
                    version: "v2.0.0".to_string(),
                },
                ToolchainCall::Tidy { dir: worktree },
            ]
        );
    }

    #[tokio::test]
    async fn dependency_impact_reads_go_mod() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);
        fixture.git.script("status", Ok(String::new()));

        let outcome = fixture
            .executor()
            .apply(&CancellationToken::new(), &target(), &item(branch))
            .await;

        let impact = outcome.dependency_impact.unwrap();
        assert!(impact.old_version_detected);
        assert_eq!(impact.old_version, "v1.9.0");
        // The mock toolchain does not rewrite go.mod, so the new version
        // matches the old one and the update is not applied.
        assert_eq!(impact.new_version, "v1.9.0");
        assert!(!impact.applied);
    }

    #[tokio::test]
    async fn canceled_tests_report_distinct_reason() {
        let branch = "b";
        let fixture = Fixture::with_existing_clone(branch);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut work = item(branch);
        work.tests = vec![sh("sleep 30")];

        let outcome = fixture.executor().apply(&cancel, &target(), &work).await;

        assert_eq!(outcome.status(), Status::Failed);
        assert_eq!(outcome.reason, "tests timed out or was canceled");
    }
}
