//! Sidecar SSE Parsing
//!
//! `/stream` answers with newline-delimited `data: {...}` frames. Network
//! chunks can split a frame (or a UTF-8 sequence) anywhere, so raw bytes are
//! buffered until a full line is available and only complete lines reach the
//! adapter. A complete line that fails to parse is a real error.

use serde::Deserialize;

use crate::types::UsageStats;
use incito_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line (without the newline).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Take whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Frames emitted by the sidecar's `/stream` endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SidecarFrame {
    Text {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    Error {
        error: String,
    },
    Done {
        #[serde(default)]
        usage: Option<UsageStats>,
        #[serde(default, rename = "finishReason")]
        finish_reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Maps sidecar frames onto `UnifiedStreamEvent`s.
#[derive(Debug, Default)]
pub struct SidecarStreamAdapter {
    finished: bool,
}

impl SidecarStreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `done` or `error` frame has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl StreamAdapter for SidecarStreamAdapter {
    fn provider_name(&self) -> &'static str {
        "claude-code-sidecar"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();

        let json_str = if let Some(rest) = trimmed.strip_prefix("data:") {
            rest.trim_start()
        } else {
            // event:, id:, retry: and comment lines carry nothing for us
            return Ok(vec![]);
        };

        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(vec![]);
        }

        let frame: SidecarFrame =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let events = match frame {
            SidecarFrame::Text { content } => vec![UnifiedStreamEvent::TextDelta { content }],
            SidecarFrame::ToolCall { id, name, input } => {
                let arguments = match input {
                    serde_json::Value::String(raw) => raw,
                    serde_json::Value::Null => "{}".to_string(),
                    other => other.to_string(),
                };
                vec![UnifiedStreamEvent::ToolComplete {
                    tool_id: id,
                    tool_name: name,
                    arguments,
                }]
            }
            SidecarFrame::Error { error } => {
                self.finished = true;
                vec![UnifiedStreamEvent::Error {
                    message: error,
                    code: None,
                }]
            }
            SidecarFrame::Done {
                usage,
                finish_reason,
            } => {
                self.finished = true;
                let mut events = Vec::with_capacity(2);
                if let Some(usage) = usage {
                    events.push(UnifiedStreamEvent::Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    });
                }
                events.push(UnifiedStreamEvent::Complete {
                    stop_reason: finish_reason,
                });
                events
            }
            SidecarFrame::Unknown => vec![],
        };

        Ok(events)
    }

    fn reset(&mut self) {
        self.finished = false;
    }
}
