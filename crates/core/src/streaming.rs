//! Unified Stream Event Types
//!
//! Provider-agnostic event types and adapter trait for processing real-time
//! model output. These types are shared across the LLM crate (sidecar
//! client) and the main crate (run mode, comparison runs).

use serde::{Deserialize, Serialize};

/// Unified streaming event that all stream adapters convert to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// Tool call complete with accumulated arguments
    ToolComplete {
        tool_id: String,
        tool_name: String,
        /// Complete JSON string of tool arguments
        arguments: String,
    },

    /// Token usage information
    Usage { input_tokens: u32, output_tokens: u32 },

    /// Error reported by the upstream provider mid-stream
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream complete
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl UnifiedStreamEvent {
    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Errors that can occur during stream adaptation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AdapterError {
    /// JSON/data parsing error
    ParseError(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Trait for adapting provider-specific stream formats to unified events.
pub trait StreamAdapter: Send + Sync {
    /// Returns the provider name for logging and identification.
    fn provider_name(&self) -> &'static str;

    /// Returns whether this adapter/provider supports tool calls.
    fn supports_tools(&self) -> bool;

    /// Adapt one complete raw stream line to unified events.
    ///
    /// A single input line may produce zero, one, or multiple events.
    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError>;

    /// Reset adapter state for a new stream.
    fn reset(&mut self) {}
}
