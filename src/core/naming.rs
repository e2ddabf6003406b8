//! core::naming
//!
//! Branch and label naming rules.
//!
//! # Features
//!
//! - Generate head branch names from a module/version pair
//! - Sanitize arbitrary strings into valid branch-name fragments
//! - Sanitize label lists for the GitHub API
//!
//! Branch generation is deterministic: the same module and version always
//! produce the same branch, which is what makes PR upsert idempotent.

use sha2::{Digest, Sha256};

/// Maximum length of a generated branch name before the hash fallback kicks in.
const MAX_BRANCH_LEN: usize = 250;

/// Maximum length of a single label accepted by the API.
const MAX_LABEL_LEN: usize = 50;

/// Maximum number of labels on one PR or issue.
const MAX_LABELS: usize = 100;

/// Sanitize a string into a branch-name fragment.
///
/// Replacement rules, applied in order:
/// - `/` and `.` and spaces become `-`
/// - `@` becomes `-at-`, `+` becomes `-plus-`
/// - anything outside `[A-Za-z0-9_-]` is stripped
/// - runs of `-` collapse to one, leading/trailing `-` are trimmed
/// - an empty result becomes the literal `branch`
///
/// # Example
///
/// ```
/// use cascade::core::naming::sanitize_branch_fragment;
///
/// assert_eq!(sanitize_branch_fragment("github.com/acme/lib"), "github-com-acme-lib");
/// assert_eq!(sanitize_branch_fragment("v2.0.0"), "v2-0-0");
/// assert_eq!(sanitize_branch_fragment("lib@v1+incompatible"), "lib-at-v1-plus-incompatible");
/// assert_eq!(sanitize_branch_fragment("???"), "branch");
/// ```
pub fn sanitize_branch_fragment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '/' | '.' | ' ' => out.push('-'),
            '@' => out.push_str("-at-"),
            '+' => out.push_str("-plus-"),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => out.push(c),
            _ => {}
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut prev_dash = false;
    for c in out.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push('-');
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        "branch".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Generate the head branch name for a module/version update.
///
/// The readable pattern is `cascade-update-<module>-<version>` with both
/// parts sanitized. When that exceeds 250 characters the whole name is
/// replaced by `cascade-update-<hash>` where `<hash>` is the first 8 hex
/// characters of `sha256(module + version)`.
///
/// # Example
///
/// ```
/// use cascade::core::naming::update_branch_name;
///
/// assert_eq!(
///     update_branch_name("example.com/lib", "v2.0.0"),
///     "cascade-update-example-com-lib-v2-0-0"
/// );
/// ```
pub fn update_branch_name(module: &str, version: &str) -> String {
    let name = format!(
        "cascade-update-{}-{}",
        sanitize_branch_fragment(module),
        sanitize_branch_fragment(version)
    );
    if name.len() <= MAX_BRANCH_LEN {
        return name;
    }

    let mut hasher = Sha256::new();
    hasher.update(module.as_bytes());
    hasher.update(version.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("cascade-update-{}", &digest[..8])
}

/// Sanitize a label list for the GitHub API.
///
/// Rules, applied per label in order: trim whitespace, drop empties,
/// truncate to 50 characters, strip `, ; : " ' < > &`, drop labels that
/// became empty. The list is then deduplicated case-insensitively keeping
/// the first occurrence, and capped at 100 entries.
///
/// Idempotent: sanitizing twice gives the same list.
///
/// # Example
///
/// ```
/// use cascade::core::naming::sanitize_labels;
///
/// let labels = vec![
///     "  automation ".to_string(),
///     "AUTOMATION".to_string(),
///     "dep:update".to_string(),
///     "".to_string(),
/// ];
/// assert_eq!(sanitize_labels(&labels), vec!["automation", "depupdate"]);
/// ```
pub fn sanitize_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for raw in labels {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let truncated: String = trimmed.chars().take(MAX_LABEL_LEN).collect();
        let cleaned: String = truncated
            .chars()
            .filter(|c| !matches!(c, ',' | ';' | ':' | '"' | '\'' | '<' | '>' | '&'))
            .collect();
        // Stripping can expose whitespace at the edges; trim again so the
        // result is a fixed point.
        let cleaned = cleaned.trim().to_string();
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(cleaned);
        if out.len() == MAX_LABELS {
            break;
        }
    }

    out
}

/// Merge broker default labels with work-item labels.
///
/// Defaults come first, then item labels, with case-sensitive
/// first-occurrence deduplication preserving insertion order. This is the
/// merge used for the label set returned on an upserted PR.
pub fn merge_labels(defaults: &[String], item: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in defaults.iter().chain(item.iter()) {
        if !out.contains(label) {
            out.push(label.clone());
        }
    }
    out
}
