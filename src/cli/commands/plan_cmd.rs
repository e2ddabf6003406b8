//! cli::commands::plan_cmd
//!
//! Print the work items a run would execute, without executing anything.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::config::load_manifest;
use crate::core::plan::plan;
use crate::core::types::Target;

/// Handle `cascade plan`.
pub fn plan_cmd(manifest_path: Option<&Path>, module: String, version: String) -> Result<()> {
    let manifest = load_manifest(manifest_path).context("loading manifest")?;
    let target = Target::new(module, version).context("invalid target")?;
    let items = plan(&manifest, &target).context("planning work items")?;

    if items.is_empty() {
        println!("No dependents in manifest; nothing to do.");
        return Ok(());
    }

    println!("Plan for {}:", target);
    for item in &items {
        let marker = if item.skip { "skip" } else { "run " };
        println!(
            "  [{}] {} -> {} (base: {}, tests: {}, extras: {})",
            marker,
            item.repo,
            item.branch_name,
            item.base_branch.as_deref().unwrap_or("<default>"),
            item.tests.len(),
            item.extra_commands.len(),
        );
    }
    println!("{} work item(s).", items.len());
    Ok(())
}
