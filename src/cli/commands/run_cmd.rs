//! cli::commands::run_cmd
//!
//! The run driver: plan, fan work items out on a bounded worker pool, and
//! report.
//!
//! # Concurrency
//!
//! Work items are grouped by repository; one group runs strictly
//! sequentially (two items for the same repo must never overlap, they
//! share a clone), while distinct repositories run in parallel bounded by
//! the worker count. An advisory lock on the workspace keeps a second
//! cascade process out entirely.
//!
//! Ctrl-C cancels the shared scope; in-flight subprocesses are killed and
//! their items report as failed with a cancellation reason.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerConfig, PrDisposition};
use crate::core::config::{default_workspace, load_manifest};
use crate::core::plan::plan;
use crate::core::types::{Outcome, Status, Target, WorkItem};
use crate::exec::{CommandRunner, Executor, GitSurface, GoToolchain, SystemGitRunner};
use crate::github::{discover_token, GitHubClient};

use super::github_client;

/// Environment variable carrying the Slack bot token.
const SLACK_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";

/// Per-item report for the end-of-run summary.
struct ItemReport {
    repo: String,
    status: Status,
    reason: String,
    pr_url: Option<String>,
}

/// Exclusive advisory lock on the workspace directory.
///
/// Released when dropped (the OS also releases it if the process dies).
struct WorkspaceLock {
    _file: std::fs::File,
}

impl WorkspaceLock {
    fn acquire(workspace: &Path) -> Result<Self> {
        let path = workspace.join(".cascade.lock");
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating lock file {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "another cascade run holds the workspace {}",
                workspace.display()
            )
        })?;
        Ok(Self { _file: file })
    }
}

/// Handle `cascade run`.
pub async fn run(
    manifest_path: Option<&Path>,
    workspace_override: Option<PathBuf>,
    module: String,
    version: String,
    dry_run: bool,
    workers: usize,
) -> Result<()> {
    let manifest = load_manifest(manifest_path).context("loading manifest")?;
    let target = Target::new(module, version).context("invalid target")?;
    let items = plan(&manifest, &target).context("planning work items")?;

    if items.is_empty() {
        println!("No dependents in manifest; nothing to do.");
        return Ok(());
    }

    let workspace = workspace_override.unwrap_or_else(default_workspace);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;
    let _lock = WorkspaceLock::acquire(&workspace)?;

    // Credentials are read once here; a dry run works without any.
    let token = match discover_token() {
        Ok(token) => token,
        Err(e) if dry_run => {
            log::debug!("run: no github token ({}); dry-run continues without one", e);
            String::new()
        }
        Err(e) => return Err(e.into()),
    };
    let slack_token = std::env::var(SLACK_TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let provider = Arc::new(github_client(token));
    let broker_config = BrokerConfig::from_manifest(&manifest.defaults, dry_run, slack_token);
    let broker = Arc::new(Broker::new(provider, target.clone(), broker_config));

    let go_binary = manifest
        .defaults
        .go_binary
        .clone()
        .unwrap_or_else(|| "go".to_string());
    let executor = Arc::new(Executor::new(
        GitSurface::new(SystemGitRunner::new()),
        GoToolchain::with_binary(go_binary),
        CommandRunner::new(),
        workspace.clone(),
    ));

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("run: interrupt received, canceling in-flight work");
            ctrl_c_cancel.cancel();
        }
    });

    // Same-repo items share a clone and must not overlap; group them and
    // run each group sequentially inside one worker slot.
    let mut groups: BTreeMap<String, Vec<WorkItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.repo.to_string()).or_default().push(item);
    }

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        let semaphore = semaphore.clone();
        let executor = executor.clone();
        let broker = broker.clone();
        let target = target.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closes");
            let mut reports = Vec::with_capacity(group.len());
            for item in group {
                reports.push(process_item(&executor, &broker, &target, &cancel, item, dry_run).await);
            }
            reports
        }));
    }

    let mut reports: Vec<ItemReport> = Vec::new();
    for handle in handles {
        reports.extend(handle.await.context("worker task panicked")?);
    }

    print_summary(&target, &reports, dry_run);

    let failed = reports
        .iter()
        .filter(|r| r.status == Status::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} work item(s) failed", failed);
    }
    Ok(())
}

async fn process_item(
    executor: &Executor<SystemGitRunner, GoToolchain>,
    broker: &Broker<GitHubClient>,
    target: &Target,
    cancel: &CancellationToken,
    item: WorkItem,
    dry_run: bool,
) -> ItemReport {
    let outcome = if dry_run {
        Outcome {
            status: Some(Status::Skipped),
            reason: "dry-run (execution skipped)".to_string(),
            ..Default::default()
        }
    } else {
        executor.apply(cancel, target, &item).await
    };

    let mut pr_url = None;
    if outcome.status() != Status::Skipped || dry_run {
        match broker.ensure_pr(cancel, &item, &outcome).await {
            Ok(PrDisposition::Upserted(pr)) => {
                pr_url = Some(pr.url);
            }
            Ok(PrDisposition::Skipped { reason }) => {
                log::debug!("run: no pull request for {}: {}", item.repo, reason);
            }
            Err(e) => {
                log::error!("run: pull request upsert failed for {}: {}", item.repo, e);
            }
        }

        match broker.notify(cancel, &item, &outcome).await {
            Ok(result) => {
                log::debug!(
                    "run: notified {} via {}",
                    item.repo,
                    result.channel
                );
            }
            Err(e) => {
                log::error!("run: notification failed for {}: {}", item.repo, e);
            }
        }
    }

    ItemReport {
        repo: item.repo.to_string(),
        status: outcome.status(),
        reason: outcome.reason.clone(),
        pr_url,
    }
}

fn print_summary(target: &Target, reports: &[ItemReport], dry_run: bool) {
    let mode = if dry_run { " (dry-run)" } else { "" };
    println!("Cascade run for {}{}:", target, mode);
    for report in reports {
        let mut line = format!("  {:<13} {}", report.status.to_string(), report.repo);
        if !report.reason.is_empty() {
            line.push_str(&format!(": {}", report.reason));
        }
        if let Some(url) = &report.pr_url {
            line.push_str(&format!(" ({})", url));
        }
        println!("{}", line);
    }
}
