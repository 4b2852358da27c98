pub mod adapters;
pub mod json;
pub mod traits;
pub mod types;

use anyhow::Context;
use std::time::Duration;

/// Shared HTTP client for every upstream source.
/// Without a timeout only the transport's own limits apply.
pub fn build_client(timeout: Option<Duration>) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().context("failed to build HTTP client")
}
