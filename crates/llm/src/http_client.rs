//! HTTP Client Factory
//!
//! The sidecar binds to localhost, so proxies are always disabled.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` for local services.
///
/// `timeout` applies to whole requests; pass `None` for streaming clients,
/// which must not time out mid-stream.
pub fn build_http_client(timeout: Option<Duration>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().no_proxy();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::other(format!("Failed to build HTTP client: {}", e)))
}
