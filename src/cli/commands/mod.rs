//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Handlers are thin: they load configuration, build the execution and
//! broker surfaces, and delegate. Nothing here touches a repository
//! directly.

mod check;
mod plan_cmd;
mod run_cmd;

pub use check::check;
pub use plan_cmd::plan_cmd;
pub use run_cmd::run;

use anyhow::Result;

use crate::github::GitHubClient;

use super::args::{Cli, Command};

/// Build the GitHub client from the environment.
///
/// `GITHUB_API_URL` points at an enterprise installation;
/// `CASCADE_INSECURE_TLS=1` skips certificate verification for
/// self-signed endpoints.
pub(crate) fn github_client(token: String) -> GitHubClient {
    let api_base = std::env::var("GITHUB_API_URL")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let insecure = std::env::var("CASCADE_INSECURE_TLS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    GitHubClient::with_options(token, api_base, insecure)
}

/// Dispatch a parsed command line to its handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let manifest = cli.manifest.as_deref();
    match cli.command {
        Command::Plan { module, version } => plan_cmd(manifest, module, version),
        Command::Run {
            module,
            version,
            dry_run,
            workers,
        } => {
            run(
                manifest,
                cli.workspace.clone(),
                module,
                version,
                dry_run,
                workers,
            )
            .await
        }
        Command::Check => check().await,
    }
}
