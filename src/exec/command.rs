//! exec::command
//!
//! Subprocess execution with deadlines, cancellation, and output capture.
//!
//! # Design
//!
//! Commands are observed, not trusted: their combined output is a primary
//! artifact (notifications embed excerpts), so capture must survive
//! non-zero exits, deadline kills, and cancellation. Both pipes are drained
//! concurrently while the process runs; whatever was produced before a kill
//! is kept.
//!
//! # Example
//!
//! ```no_run
//! use cascade::core::types::CommandSpec;
//! use cascade::exec::command::CommandRunner;
//! use std::collections::BTreeMap;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let runner = CommandRunner::new();
//! let cancel = CancellationToken::new();
//! let spec = CommandSpec::new(["echo", "hello"]);
//! let result = runner
//!     .run(&cancel, Path::new("."), &spec, &BTreeMap::new(), None)
//!     .await
//!     .unwrap();
//! assert!(result.succeeded());
//! # });
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::core::types::{CommandResult, CommandSpec};

/// Deadline applied when the caller passes none (or zero).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Errors from command execution.
///
/// Every variant except [`CommandError::Empty`] carries the
/// [`CommandResult`] with whatever output was captured, so callers can
/// record the attempt even when it failed.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command had no program to run; nothing was spawned.
    #[error("empty command")]
    Empty,

    /// The command spawned but did not succeed (non-zero exit or failed
    /// spawn).
    #[error("command `{}` failed: {}", .0.command, .0.error.as_deref().unwrap_or("unknown"))]
    Failed(Box<CommandResult>),

    /// The command was cut short by cancellation or its deadline.
    #[error("command `{}` timed out or was canceled: {}", .0.command, .0.error.as_deref().unwrap_or("unknown"))]
    Interrupted(Box<CommandResult>),
}

impl CommandError {
    /// Extract the captured result, if the command got far enough to have one.
    pub fn into_command_result(self) -> Option<CommandResult> {
        match self {
            CommandError::Empty => None,
            CommandError::Failed(result) | CommandError::Interrupted(result) => Some(*result),
        }
    }

    /// Whether this failure came from cancellation or a deadline.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CommandError::Interrupted(_))
    }
}

/// Runs user-supplied commands in a work item's worktree.
///
/// The effective working directory is the base directory joined with the
/// command's relative `dir`; the effective environment is the ambient
/// process environment with the supplied overrides winning collisions.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    default_timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    /// Create a runner with the standard 15-minute default deadline.
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Create a runner with a custom default deadline.
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Run one command to completion.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation scope; observed while the child runs
    /// * `base_dir` - Directory the command's `dir` is resolved against
    /// * `spec` - Program, arguments, and optional relative directory
    /// * `env` - Environment overrides merged over the ambient environment
    /// * `timeout` - Deadline; `None` or zero uses the runner default
    ///
    /// # Errors
    ///
    /// - [`CommandError::Empty`] for an empty argv (nothing is spawned)
    /// - [`CommandError::Failed`] for spawn failures and non-zero exits
    /// - [`CommandError::Interrupted`] when the deadline or cancellation
    ///   killed the child; captured output is preserved in the result
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        base_dir: &Path,
        spec: &CommandSpec,
        env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, CommandError> {
        if spec.is_empty() {
            return Err(CommandError::Empty);
        }

        let dir = effective_dir(base_dir, spec);
        let deadline = match timeout {
            Some(d) if d > Duration::ZERO => d,
            _ => self.default_timeout,
        };

        let started = Instant::now();

        let mut cmd = Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..])
            .current_dir(&dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let result = CommandResult {
                    command: spec.clone(),
                    output: String::new(),
                    error: Some(format!("spawn failed: {}", source)),
                    exit_code: -1,
                    duration: started.elapsed(),
                };
                return Err(CommandError::Failed(Box::new(result)));
            }
        };

        // Drain both pipes while the child runs so a full pipe never wedges it.
        let stdout_pipe = child.stdout.take().expect("stdout was piped");
        let stderr_pipe = child.stderr.take().expect("stderr was piped");
        let (stdout_task, stdout_buf) = drain(stdout_pipe);
        let (stderr_task, stderr_buf) = drain(stderr_pipe);

        enum Exit {
            Status(Option<i32>),
            Canceled,
            DeadlineExceeded,
        }

        let exit = tokio::select! {
            status = child.wait() => {
                Exit::Status(status.ok().and_then(|s| s.code()))
            }
            _ = cancel.cancelled() => Exit::Canceled,
            _ = tokio::time::sleep(deadline) => Exit::DeadlineExceeded,
        };
        if !matches!(exit, Exit::Status(_)) {
            let _ = child.kill().await;
        }

        // Readers finish on pipe EOF. After a kill, a grandchild holding
        // the pipe open must not stall the pipeline, so the wait is
        // bounded; whatever arrived by then is the captured output.
        match exit {
            Exit::Status(_) => {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
            }
            _ => {
                let grace = Duration::from_secs(2);
                let _ = tokio::time::timeout(grace, stdout_task).await;
                let _ = tokio::time::timeout(grace, stderr_task).await;
            }
        }
        let mut output = String::from_utf8_lossy(&stdout_buf.lock().unwrap()).into_owned();
        output.push_str(&String::from_utf8_lossy(&stderr_buf.lock().unwrap()));

        let duration = started.elapsed();
        match exit {
            Exit::Status(Some(0)) => Ok(CommandResult {
                command: spec.clone(),
                output,
                error: None,
                exit_code: 0,
                duration,
            }),
            Exit::Status(code) => {
                let exit_code = code.unwrap_or(-1);
                let result = CommandResult {
                    command: spec.clone(),
                    output,
                    error: Some(match code {
                        Some(c) => format!("exit status {}", c),
                        None => "terminated by signal".to_string(),
                    }),
                    exit_code,
                    duration,
                };
                Err(CommandError::Failed(Box::new(result)))
            }
            Exit::Canceled => {
                let result = CommandResult {
                    command: spec.clone(),
                    output,
                    error: Some("canceled".to_string()),
                    exit_code: -1,
                    duration,
                };
                Err(CommandError::Interrupted(Box::new(result)))
            }
            Exit::DeadlineExceeded => {
                let result = CommandResult {
                    command: spec.clone(),
                    output,
                    error: Some("deadline exceeded".to_string()),
                    exit_code: -1,
                    duration,
                };
                Err(CommandError::Interrupted(Box::new(result)))
            }
        }
    }
}

/// Spawn a reader that drains a pipe into a shared buffer.
///
/// The shared buffer keeps partial output reachable even when the reader
/// is abandoned after a kill.
pub(crate) fn drain<R>(mut pipe: R) -> (tokio::task::JoinHandle<()>, Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let task_buf = buf.clone();
    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => task_buf.lock().unwrap().extend_from_slice(&chunk[..n]),
            }
        }
    });
    (task, buf)
}

/// Join the command's relative directory under the base directory.
///
/// Relative only by convention; this is a convenience for monorepo
/// layouts, not a security boundary.
fn effective_dir(base_dir: &Path, spec: &CommandSpec) -> PathBuf {
    match &spec.dir {
        Some(dir) => base_dir.join(dir),
        None => base_dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner::new()
    }

    fn no_env() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[tokio::test]
    async fn successful_command_captures_output() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["sh", "-c", "echo hello"]);
        let result = runner()
            .run(&cancel, Path::new("."), &spec, &no_env(), None)
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn empty_command_never_spawns() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(Vec::<String>::new());
        let err = runner()
            .run(&cancel, Path::new("."), &spec, &no_env(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Empty));
    }

    #[tokio::test]
    async fn nonzero_exit_preserves_output() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["sh", "-c", "echo partial; exit 3"]);
        let err = runner()
            .run(&cancel, Path::new("."), &spec, &no_env(), None)
            .await
            .unwrap_err();
        let result = err.into_command_result().unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.error.as_deref(), Some("exit status 3"));
        assert_eq!(result.output.trim(), "partial");
    }

    #[tokio::test]
    async fn stderr_is_captured_too() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["sh", "-c", "echo oops >&2; exit 1"]);
        let err = runner()
            .run(&cancel, Path::new("."), &spec, &no_env(), None)
            .await
            .unwrap_err();
        let result = err.into_command_result().unwrap();
        assert!(result.output.contains("oops"));
    }

    #[tokio::test]
    async fn env_override_wins_collision() {
        let cancel = CancellationToken::new();
        std::env::set_var("CASCADE_TEST_VAR", "ambient");
        let mut env = BTreeMap::new();
        env.insert("CASCADE_TEST_VAR".to_string(), "override".to_string());
        let spec = CommandSpec::new(["sh", "-c", "echo $CASCADE_TEST_VAR"]);
        let result = runner()
            .run(&cancel, Path::new("."), &spec, &env, None)
            .await
            .unwrap();
        assert_eq!(result.output.trim(), "override");
    }

    #[tokio::test]
    async fn relative_dir_is_joined() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["pwd"]).in_dir("sub");
        let result = runner()
            .run(&cancel, tmp.path(), &spec, &no_env(), None)
            .await
            .unwrap();
        assert!(result.output.trim().ends_with("sub"));
    }

    #[tokio::test]
    async fn deadline_kills_and_keeps_partial_output() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["sh", "-c", "echo early; sleep 30"]);
        let err = runner()
            .run(
                &cancel,
                Path::new("."),
                &spec,
                &no_env(),
                Some(Duration::from_millis(300)),
            )
            .await
            .unwrap_err();
        assert!(err.is_interrupted());
        let result = err.into_command_result().unwrap();
        assert_eq!(result.error.as_deref(), Some("deadline exceeded"));
        assert_eq!(result.output.trim(), "early");
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let cancel = CancellationToken::new();
        let child_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            child_cancel.cancel();
        });
        let spec = CommandSpec::new(["sleep", "30"]);
        let started = Instant::now();
        let err = runner()
            .run(&cancel, Path::new("."), &spec, &no_env(), None)
            .await
            .unwrap_err();
        assert!(err.is_interrupted());
        assert!(started.elapsed() < Duration::from_secs(10));
        let result = err.into_command_result().unwrap();
        assert_eq!(result.error.as_deref(), Some("canceled"));
    }

    #[tokio::test]
    async fn zero_timeout_uses_default() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["sh", "-c", "exit 0"]);
        // A zero deadline would kill the child instantly; the default must
        // apply instead and let this trivial command finish.
        let result = runner()
            .run(
                &cancel,
                Path::new("."),
                &spec,
                &no_env(),
                Some(Duration::ZERO),
            )
            .await
            .unwrap();
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_failure() {
        let cancel = CancellationToken::new();
        let spec = CommandSpec::new(["definitely-not-a-real-binary-cascade"]);
        let err = runner()
            .run(&cancel, Path::new("."), &spec, &no_env(), None)
            .await
            .unwrap_err();
        let result = err.into_command_result().unwrap();
        assert_eq!(result.exit_code, -1);
        assert!(result.error.as_deref().unwrap().starts_with("spawn failed"));
    }
}
