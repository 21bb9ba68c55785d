//! Health and Sidecar Commands

use incito_llm::sidecar::{check_claude_executable, find_claude_executable, ClaudeExecutableInfo};

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::AppState;

/// Get the health status of all backend services
pub async fn get_health(state: &AppState) -> CommandResponse<HealthResponse> {
    CommandResponse::ok(state.health().await)
}

/// Start the sidecar unless it is already serving
pub async fn ensure_sidecar(state: &AppState) -> CommandResponse<bool> {
    state.ensure_sidecar().await.into()
}

/// Check a specific Claude Code executable, or search `PATH` when none is given
pub async fn locate_claude(path: Option<&str>) -> CommandResponse<ClaudeExecutableInfo> {
    let info = match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => check_claude_executable(path).await,
        None => find_claude_executable().await,
    };
    CommandResponse::ok(info)
}
