//! core::plan
//!
//! Planner: manifest + target → ordered work items.
//!
//! # Design
//!
//! Planning is pure. It reads the manifest and the target, applies defaults,
//! generates the head branch name, and renders the commit message. No
//! filesystem or network access happens here; a plan can be printed and
//! thrown away without side effects.
//!
//! Per-item PR and notification overrides are carried on the work item
//! as-is; the broker composes them over its own defaults at delivery time,
//! so planning never needs broker configuration.

use std::time::Duration;

use crate::core::config::Manifest;
use crate::core::naming::update_branch_name;
use crate::core::types::{RepoSlug, Target, ValidationError, WorkItem};

/// Commit message used when the manifest does not set one.
const DEFAULT_COMMIT_TEMPLATE: &str = "chore: bump {{ module }} to {{ version }}";

/// Build the ordered work-item list for a target.
///
/// Manifest order is preserved; skipped dependents still produce a work
/// item (marked `skip`) so the run report accounts for them.
///
/// # Errors
///
/// Returns `ValidationError` if a repository identifier does not parse.
/// A manifest loaded through `core::config` has already been checked, so
/// this only fires for hand-built manifests.
pub fn plan(manifest: &Manifest, target: &Target) -> Result<Vec<WorkItem>, ValidationError> {
    let branch_name = update_branch_name(&target.module, &target.version);
    let commit_template = manifest
        .defaults
        .commit_template
        .as_deref()
        .unwrap_or(DEFAULT_COMMIT_TEMPLATE);
    let commit_message = render_commit_message(commit_template, target);

    let mut items = Vec::with_capacity(manifest.dependents.len());
    for dep in &manifest.dependents {
        let repo = RepoSlug::parse(&dep.repo)?;
        let timeout_secs = dep.timeout_secs.or(manifest.defaults.timeout_secs);

        items.push(WorkItem {
            repo,
            module: dep.module.clone(),
            base_branch: dep
                .branch
                .clone()
                .or_else(|| manifest.defaults.base_branch.clone()),
            branch_name: branch_name.clone(),
            commit_message: commit_message.clone(),
            skip: dep.skip,
            timeout: timeout_secs.map(Duration::from_secs),
            env: dep.env.clone(),
            tests: dep.tests.iter().map(|e| e.as_spec()).collect(),
            extra_commands: dep.extra_commands.iter().map(|e| e.as_spec()).collect(),
            pr: dep.pr.clone().unwrap_or_default(),
            notifications: dep.notifications.clone().unwrap_or_default(),
        });
    }

    Ok(items)
}

/// Substitute `{{ module }}` and `{{ version }}` in a commit template.
///
/// An unpinned target renders its version as `latest`.
fn render_commit_message(template: &str, target: &Target) -> String {
    let version = if target.is_pinned() {
        target.version.as_str()
    } else {
        "latest"
    };
    template
        .replace("{{ module }}", &target.module)
        .replace("{{ version }}", version)
}
