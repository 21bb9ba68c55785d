//! LLM Types
//!
//! Request/response shapes shared by every provider plus the `LlmError`
//! taxonomy (configuration, transient network, cancellation, parse).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by providers and the sidecar client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Missing binary, missing credentials and similar; never retried.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        hint: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Server error ({status:?}): {message}")]
    ServerError {
        message: String,
        status: Option<u16>,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u32>,
    },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("{message}")]
    Other { message: String },
}

impl LlmError {
    pub fn configuration(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            hint: hint.map(str::to_string),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Cancellation is expected control flow, not a failure to report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// User-facing hint, if the error carries one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Configuration { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::network(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::parse(err.to_string())
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Conversation role. The sidecar only accepts user/assistant turns; the
/// system prompt travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Tool exposed to the model; `input_schema` is a JSON schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Single-shot generation request (`POST /generate`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
}

/// Streaming chat request (`POST /stream`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default, alias = "promptTokens")]
    pub input_tokens: u32,
    #[serde(default, alias = "completionTokens")]
    pub output_tokens: u32,
}

impl UsageStats {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Complete (non-streamed) generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub text: String,
    #[serde(default)]
    pub usage: Option<UsageStats>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_predicate() {
        assert!(LlmError::Cancelled.is_cancelled());
        assert!(!LlmError::network("down").is_cancelled());
    }

    #[test]
    fn test_configuration_hint() {
        let err = LlmError::configuration("sidecar missing", Some("install it"));
        assert_eq!(err.hint(), Some("install it"));
        assert!(err.to_string().contains("sidecar missing"));
    }

    #[test]
    fn test_stream_request_omits_empty_fields() {
        let req = StreamRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("tools").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_accepts_sdk_usage_names() {
        let resp: LlmResponse = serde_json::from_str(
            r#"{"text":"ok","usage":{"promptTokens":3,"completionTokens":4},"finishReason":"stop"}"#,
        )
        .unwrap();
        assert_eq!(resp.usage.unwrap().total(), 7);
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }
}
