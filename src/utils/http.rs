// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::{CrawlerConfig, ResolverConfig};

/// Create a configured asynchronous HTTP client for the RPC API.
///
/// The request timeout matches the per-call crawl timeout, so a stalled block
/// request surfaces as a timeout error.
pub fn create_client(
    resolver: &ResolverConfig,
    crawler: &CrawlerConfig,
) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&resolver.user_agent)
        .timeout(crawler.timeout())
        .connect_timeout(Duration::from_secs(crawler.timeout_secs.min(5)))
        .build()?;
    Ok(client)
}
