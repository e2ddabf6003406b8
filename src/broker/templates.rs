//! broker::templates
//!
//! Template rendering for PR titles/bodies, notification messages, and
//! failure-tracking issues.
//!
//! # Syntax
//!
//! Simple `{{ key }}` substitution over a context dictionary drawn from
//! the target, the work item, and the outcome. The lenient renderer
//! leaves unknown placeholders intact (harmless in a PR body); the strict
//! renderer reports them, and is used where a leftover placeholder would
//! corrupt a dedup key (issue titles).
//!
//! # Helpers
//!
//! Helper output is precomputed into context keys rather than invoked
//! from templates: `commit_short` (8 chars), `reason_short` (200 chars),
//! and `failure_command_escaped` (Markdown-escaped).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::types::{Outcome, Status, Target, WorkItem};

/// Default PR title.
pub const DEFAULT_PR_TITLE: &str = "chore: update {{ module }} to {{ version }}";

/// Default PR body.
pub const DEFAULT_PR_BODY: &str = "\
Automated dependency update.

- **Module**: `{{ module }}`
- **Version**: `{{ version }}`
- **Branch**: `{{ branch }}`
- **Dependency**: {{ dependency }}

Commit: {{ commit_short }}
";

/// Default Slack/webhook message.
pub const DEFAULT_MESSAGE: &str = "\
{{ status_emoji }} cascade: {{ module }} -> {{ version }} in {{ repo }} ({{ status }})
branch: {{ branch }}
commit: {{ commit_short }}
reason: {{ reason_short }}
failing test: {{ failing_test }}
failing command: {{ failure_command }}
dependency: {{ dependency }}";

/// Default failure-issue title.
///
/// `version_suffix` is ` to <version>` for pinned targets and empty
/// otherwise, matching `Cascade failure: update <module>[ to <version>]
/// in <repo>`.
pub const DEFAULT_ISSUE_TITLE: &str =
    "Cascade failure: update {{ module }}{{ version_suffix }} in {{ repo }}";

/// Default failure-issue body.
pub const DEFAULT_ISSUE_BODY: &str = "\
Cascade failed to update `{{ module }}` to `{{ version }}` in `{{ repo }}`.

- **Branch**: `{{ branch }}`
- **Status**: {{ status }}
- **Reason**: {{ reason_short }}
- **Failing command**: {{ failure_command_escaped }}
- **Dependency**: {{ dependency }}

```
{{ failure_message }}
```
";

/// Errors from strict template rendering.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// Placeholders survived substitution.
    #[error("template {name} failed to render: unresolved placeholders: {}", .placeholders.join(", "))]
    Unresolved {
        /// The template's name (for the error message)
        name: String,
        /// The placeholders that had no context value
        placeholders: Vec<String>,
    },
}

/// Substitute `{{ key }}` placeholders, leaving unknown ones intact.
pub fn render(template: &str, ctx: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in ctx {
        out = out.replace(&format!("{{{{ {} }}}}", key), value);
    }
    out
}

/// Substitute placeholders and fail on any that remain.
pub fn render_strict(
    name: &str,
    template: &str,
    ctx: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let rendered = render(template, ctx);
    let leftovers = unresolved_placeholders(&rendered);
    if leftovers.is_empty() {
        Ok(rendered)
    } else {
        Err(TemplateError::Unresolved {
            name: name.to_string(),
            placeholders: leftovers,
        })
    }
}

/// Collect `{{ ... }}` placeholders remaining in a rendered string.
fn unresolved_placeholders(rendered: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = rendered;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim().to_string();
                if !name.is_empty() && !out.contains(&name) {
                    out.push(name);
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out
}

/// First 8 characters of a string (commit hashes in messages).
pub fn truncate8(s: &str) -> String {
    s.chars().take(8).collect()
}

/// First 200 characters of a string (reasons in messages).
pub fn truncate200(s: &str) -> String {
    s.chars().take(200).collect()
}

/// Escape Markdown control characters so command strings render literally.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '`' | '*' | '_' | '[' | ']' | '(' | ')' | '#' | '>' | '|' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Emoji for a status, as embedded in notification messages.
pub fn status_emoji(status: Status) -> &'static str {
    match status {
        Status::Completed => "✅",
        Status::Failed => "❌",
        Status::ManualReview => "⚠️",
        Status::Skipped => "⏭️",
    }
}

/// Build the substitution context for one work item's outcome.
pub fn context(target: &Target, item: &WorkItem, outcome: &Outcome) -> BTreeMap<String, String> {
    let version = if target.is_pinned() {
        target.version.clone()
    } else {
        "latest".to_string()
    };
    let version_suffix = if target.is_pinned() {
        format!(" to {}", target.version)
    } else {
        String::new()
    };

    let failing_test = outcome
        .first_failed_test()
        .map(|r| {
            format!(
                "`{}`: {}",
                r.command,
                r.error.as_deref().unwrap_or("failed")
            )
        })
        .unwrap_or_default();

    let dependency = outcome
        .dependency_impact
        .as_ref()
        .map(|impact| impact.summary())
        .unwrap_or_default();

    let failure_command = outcome.failure_command.clone().unwrap_or_default();

    let mut ctx = BTreeMap::new();
    ctx.insert("module".to_string(), target.module.clone());
    ctx.insert("version".to_string(), version);
    ctx.insert("version_suffix".to_string(), version_suffix);
    ctx.insert("repo".to_string(), item.repo.to_string());
    ctx.insert("owner".to_string(), item.repo.owner().to_string());
    ctx.insert("repo_name".to_string(), item.repo.name().to_string());
    ctx.insert("branch".to_string(), item.branch_name.clone());
    ctx.insert(
        "base_branch".to_string(),
        item.base_branch.clone().unwrap_or_default(),
    );
    ctx.insert("commit".to_string(), outcome.commit_hash.clone());
    ctx.insert(
        "commit_short".to_string(),
        truncate8(&outcome.commit_hash),
    );
    ctx.insert("status".to_string(), outcome.status().to_string());
    ctx.insert(
        "status_emoji".to_string(),
        status_emoji(outcome.status()).to_string(),
    );
    ctx.insert("reason".to_string(), outcome.reason.clone());
    ctx.insert("reason_short".to_string(), truncate200(&outcome.reason));
    ctx.insert(
        "failure_summary".to_string(),
        outcome.failure_summary.clone().unwrap_or_default(),
    );
    ctx.insert(
        "failure_message".to_string(),
        outcome.failure_message.clone().unwrap_or_default(),
    );
    ctx.insert(
        "failure_command_escaped".to_string(),
        escape_markdown(&failure_command),
    );
    ctx.insert("failure_command".to_string(), failure_command);
    ctx.insert("failing_test".to_string(), failing_test);
    ctx.insert("dependency".to_string(), dependency);
    ctx
}
