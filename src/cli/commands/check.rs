//! cli::commands::check
//!
//! Pre-flight validation: token discovery, the `/user` probe, and the
//! rate-limit gate.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::github::discover_token;

use super::github_client;

/// Handle `cascade check`.
pub async fn check() -> Result<()> {
    let token = discover_token().context("resolving github credentials")?;
    let client = github_client(token);
    let cancel = CancellationToken::new();

    client
        .validate_auth(&cancel)
        .await
        .context("validating github token")?;
    println!("GitHub token: ok");

    let limit = client
        .check_rate_limit(&cancel)
        .await
        .context("checking rate limit")?;
    println!(
        "Rate limit: ok ({} of {} remaining, resets {})",
        limit.remaining,
        limit.limit,
        limit.reset_time()
    );
    Ok(())
}
