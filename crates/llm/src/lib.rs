//! Incito LLM
//!
//! Model access for Incito goes through a local sidecar process that wraps
//! the Claude Code SDK. This crate provides:
//! - the `LlmProvider` trait with streaming as an async `Stream`
//! - the sidecar HTTP client, SSE parser and process lifecycle manager
//! - the HTTP client factory and the `LlmError` taxonomy

pub mod http_client;
pub mod provider;
pub mod sidecar;
pub mod types;

pub use http_client::build_http_client;
pub use provider::{parse_http_error, EventStream, LlmProvider};
pub use sidecar::{SidecarClient, SidecarManager, SidecarProvider};
pub use types::*;
