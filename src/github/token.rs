//! github::token
//!
//! Credential discovery from the environment.
//!
//! Tokens are read once at configuration time; the resulting value is
//! immutable shared state for the rest of the run.

use super::traits::AuthError;

/// Environment variables consulted for a token, in order.
pub const TOKEN_ENV_VARS: [&str; 3] = ["GITHUB_TOKEN", "GITHUB_ACCESS_TOKEN", "GH_TOKEN"];

/// Resolve a GitHub token from the environment.
///
/// Checks `GITHUB_TOKEN`, `GITHUB_ACCESS_TOKEN`, and `GH_TOKEN` in order
/// and returns the first non-empty value, whitespace-trimmed.
///
/// # Errors
///
/// Returns [`AuthError::MissingToken`] (which names all three variables)
/// when none is set.
pub fn discover_token() -> Result<String, AuthError> {
    for var in TOKEN_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }
    Err(AuthError::MissingToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment mutation is process-global; serialize these tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for var in TOKEN_ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn first_set_variable_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("GITHUB_ACCESS_TOKEN", "second");
        std::env::set_var("GH_TOKEN", "third");

        assert_eq!(discover_token().unwrap(), "second");

        std::env::set_var("GITHUB_TOKEN", "first");
        assert_eq!(discover_token().unwrap(), "first");
        clear_all();
    }

    #[test]
    fn values_are_trimmed() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("GH_TOKEN", "  padded-token\n");
        assert_eq!(discover_token().unwrap(), "padded-token");
        clear_all();
    }

    #[test]
    fn whitespace_only_is_skipped() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("GITHUB_TOKEN", "   ");
        std::env::set_var("GH_TOKEN", "real");
        assert_eq!(discover_token().unwrap(), "real");
        clear_all();
    }

    #[test]
    fn missing_token_names_all_variables() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let err = discover_token().unwrap_err();
        let message = err.to_string();
        for var in TOKEN_ENV_VARS {
            assert!(message.contains(var), "message should name {}", var);
        }
    }
}
