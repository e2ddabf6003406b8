//! exec::modfile
//!
//! Dependency inspector: read the resolved version of one module from a
//! repository's go.mod.
//!
//! # Design
//!
//! Detection is advisory. The captured versions populate notification
//! bodies and issue descriptions; a parse problem must never turn a
//! healthy update into a reported failure. The capture helpers therefore
//! append errors to [`DependencyImpact::notes`] instead of propagating
//! them.
//!
//! # Search order
//!
//! 1. Direct requirements (`require` lines and blocks)
//! 2. Replace directives: the replacement version, or the replacement
//!    path when the replacement carries no version

use std::path::Path;

use thiserror::Error;

use crate::core::types::DependencyImpact;

/// Errors from reading a dependency manifest.
#[derive(Debug, Error)]
pub enum ModfileError {
    #[error("dependency check failed for {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read `dir/go.mod` and look up one module's version.
///
/// Returns `Ok(None)` when the module is not mentioned at all.
pub fn read_module_version(dir: &Path, module: &str) -> Result<Option<String>, ModfileError> {
    let path = dir.join("go.mod");
    let content = std::fs::read_to_string(&path).map_err(|source| ModfileError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(module_version(&content, module))
}

/// Find a module's version in go.mod content.
///
/// Direct requirements win over replace directives.
pub fn module_version(content: &str, module: &str) -> Option<String> {
    if let Some(version) = require_version(content, module) {
        return Some(version);
    }
    replace_version(content, module)
}

fn require_version(content: &str, module: &str) -> Option<String> {
    let mut in_block = false;
    for line in content.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        if in_block {
            if line == ")" {
                in_block = false;
                continue;
            }
            let mut tokens = line.split_whitespace();
            if tokens.next() == Some(module) {
                if let Some(version) = tokens.next() {
                    return Some(version.to_string());
                }
            }
            continue;
        }

        if line == "require (" {
            in_block = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix("require ") {
            let mut tokens = rest.split_whitespace();
            if tokens.next() == Some(module) {
                if let Some(version) = tokens.next() {
                    return Some(version.to_string());
                }
            }
        }
    }
    None
}

fn replace_version(content: &str, module: &str) -> Option<String> {
    let mut in_block = false;
    for line in content.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        let directive = if in_block {
            if line == ")" {
                in_block = false;
                continue;
            }
            Some(line)
        } else if line == "replace (" {
            in_block = true;
            None
        } else {
            line.strip_prefix("replace ")
        };

        let Some(directive) = directive else { continue };
        let Some((lhs, rhs)) = directive.split_once("=>") else {
            continue;
        };

        // The left side is `module [version]`.
        if lhs.split_whitespace().next() != Some(module) {
            continue;
        }

        let rhs_tokens: Vec<&str> = rhs.split_whitespace().collect();
        return match rhs_tokens.as_slice() {
            [_, version] => Some(version.to_string()),
            [path] => Some(path.to_string()),
            _ => None,
        };
    }
    None
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Capture the pre-update version into an impact record.
///
/// Parse errors become a `before update:` note; they do not abort
/// execution.
pub fn capture_old(impact: &mut DependencyImpact, dir: &Path) {
    match read_module_version(dir, &impact.module) {
        Ok(Some(version)) => {
            impact.old_version = version;
            impact.old_version_detected = true;
        }
        Ok(None) => {
            impact.old_version_detected = false;
        }
        Err(e) => {
            impact.notes.push(format!("before update: {}", e));
        }
    }
    impact.recompute_applied();
}

/// Capture the post-update version into an impact record.
///
/// Called after each mutation with a phase tag (`after update`,
/// `after tidy`). Same non-fatal note semantics as [`capture_old`].
pub fn capture_new(impact: &mut DependencyImpact, dir: &Path, phase: &str) {
    match read_module_version(dir, &impact.module) {
        Ok(Some(version)) => {
            impact.new_version = version;
            impact.new_version_detected = true;
        }
        Ok(None) => {
            impact.new_version_detected = false;
        }
        Err(e) => {
            impact.notes.push(format!("{}: {}", phase, e));
        }
    }
    impact.recompute_applied();
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_MOD: &str = r#"
module github.com/acme/svc

go 1.22

require (
    github.com/acme/lib v1.9.0
    github.com/other/dep v0.3.1 // indirect
)

require github.com/single/dep v2.0.0+incompatible

replace github.com/replaced/mod => github.com/fork/mod v1.2.3

replace github.com/local/mod => ../local

replace (
    github.com/blocked/mod v0.1.0 => github.com/fork/blocked v0.2.0
)
"#;

    mod lookup {
        use super::*;

        #[test]
        fn finds_block_requirement() {
            assert_eq!(
                module_version(GO_MOD, "github.com/acme/lib"),
                Some("v1.9.0".to_string())
            );
        }

        #[test]
        fn finds_indirect_requirement() {
            assert_eq!(
                module_version(GO_MOD, "github.com/other/dep"),
                Some("v0.3.1".to_string())
            );
        }

        #[test]
        fn finds_single_line_requirement() {
            assert_eq!(
                module_version(GO_MOD, "github.com/single/dep"),
                Some("v2.0.0+incompatible".to_string())
            );
        }

        #[test]
        fn replace_yields_replacement_version() {
            assert_eq!(
                module_version(GO_MOD, "github.com/replaced/mod"),
                Some("v1.2.3".to_string())
            );
        }

        #[test]
        fn replace_without_version_yields_path() {
            assert_eq!(
                module_version(GO_MOD, "github.com/local/mod"),
                Some("../local".to_string())
            );
        }

        #[test]
        fn replace_block_with_lhs_version() {
            assert_eq!(
                module_version(GO_MOD, "github.com/blocked/mod"),
                Some("v0.2.0".to_string())
            );
        }

        #[test]
        fn missing_module_is_none() {
            assert_eq!(module_version(GO_MOD, "github.com/absent/mod"), None);
        }

        #[test]
        fn require_wins_over_replace() {
            let content = r#"
require github.com/acme/lib v1.0.0
replace github.com/acme/lib => github.com/fork/lib v9.9.9
"#;
            assert_eq!(
                module_version(content, "github.com/acme/lib"),
                Some("v1.0.0".to_string())
            );
        }

        #[test]
        fn prefix_module_names_do_not_match() {
            assert_eq!(module_version(GO_MOD, "github.com/acme/li"), None);
        }
    }

    mod capture {
        use super::*;

        #[test]
        fn capture_old_populates_version() {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::write(tmp.path().join("go.mod"), GO_MOD).unwrap();

            let mut impact = DependencyImpact::new("github.com/acme/lib", "v2.0.0");
            capture_old(&mut impact, tmp.path());
            assert!(impact.old_version_detected);
            assert_eq!(impact.old_version, "v1.9.0");
            assert!(impact.notes.is_empty());
        }

        #[test]
        fn capture_errors_become_notes() {
            let tmp = tempfile::tempdir().unwrap();
            // No go.mod in the directory.
            let mut impact = DependencyImpact::new("github.com/acme/lib", "v2.0.0");
            capture_old(&mut impact, tmp.path());
            capture_new(&mut impact, tmp.path(), "after update");

            assert!(!impact.old_version_detected);
            assert!(!impact.new_version_detected);
            assert_eq!(impact.notes.len(), 2);
            assert!(impact.notes[0].starts_with("before update: "));
            assert!(impact.notes[1].starts_with("after update: "));
        }

        #[test]
        fn capture_new_recomputes_applied() {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::write(tmp.path().join("go.mod"), GO_MOD).unwrap();

            let mut impact = DependencyImpact::new("github.com/acme/lib", "v2.0.0");
            impact.old_version = "v1.0.0".to_string();
            impact.old_version_detected = true;

            capture_new(&mut impact, tmp.path(), "after tidy");
            assert!(impact.new_version_detected);
            assert_eq!(impact.new_version, "v1.9.0");
            assert!(impact.applied);
        }
    }
}
