//! Claude Code Sidecar
//!
//! Client, SSE parsing, process launching and lifecycle management for the
//! local HTTP sidecar that proxies to the Claude Code SDK.

pub mod client;
pub mod manager;
pub mod process;
pub mod provider;
pub mod sse;

pub use client::{AuthStatus, HealthInfo, SidecarClient, DEFAULT_SIDECAR_URL};
pub use manager::{HealthPolling, ServerOrigin, SidecarManager};
pub use process::{
    check_claude_executable, find_claude_executable, ClaudeExecutableInfo, ProcessLauncher,
    SidecarLauncher, CLAUDE_PATH_ENV,
};
pub use provider::SidecarProvider;
pub use sse::{SidecarStreamAdapter, SseLineBuffer};
