//! github
//!
//! GitHub surface: credential discovery, the API client, and the provider
//! trait the broker drives.
//!
//! # Modules
//!
//! - `traits`: Provider capability plus request/response records
//! - [`client`]: REST implementation with auth validation and rate-limit
//!   surveillance
//! - [`token`]: Environment-based credential discovery
//! - [`mock`]: In-memory provider for deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use cascade::github::{discover_token, GitHubClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let token = discover_token().unwrap();
//! let client = GitHubClient::new(token);
//! client.validate_auth(&CancellationToken::new()).await.unwrap();
//! # });
//! ```

pub mod client;
pub mod mock;
pub mod token;
mod traits;

pub use client::{GitHubClient, RateLimit};
pub use token::{discover_token, TOKEN_ENV_VARS};
pub use traits::*;
