//! LLM Provider Trait
//!
//! Defines the common interface for model backends. Streaming is exposed as
//! a finite async `Stream` of unified events; callers cancel by dropping the
//! stream (or racing it against a cancellation token).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::types::{GenerateRequest, LlmError, LlmResponse, LlmResult, StreamRequest};
use incito_core::streaming::UnifiedStreamEvent;

/// Boxed stream of unified events produced by `LlmProvider::stream`.
pub type EventStream = Pin<Box<dyn Stream<Item = LlmResult<UnifiedStreamEvent>> + Send>>;

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable identifier used as the key of comparison results.
    fn id(&self) -> &str;

    /// Model name sent with requests, if pinned.
    fn model(&self) -> Option<&str> {
        None
    }

    /// Returns whether this provider understands tool definitions.
    fn supports_tools(&self) -> bool;

    /// Single request/response generation.
    async fn generate(&self, request: GenerateRequest) -> LlmResult<LlmResponse>;

    /// Open a streaming generation.
    async fn stream(&self, request: StreamRequest) -> LlmResult<EventStream>;

    /// Soft reachability check; never errors.
    async fn health_check(&self) -> bool;
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    let message = extract_error_message(body);
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: {}", provider, message),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound { model: message },
        429 => LlmError::RateLimited {
            message,
            retry_after: None,
        },
        400 => LlmError::InvalidRequest { message },
        500..=599 => LlmError::ServerError {
            message,
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, message),
        },
    }
}

/// Pull `error` out of a `{"error": "..."}` body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
