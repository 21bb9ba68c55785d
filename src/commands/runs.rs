//! Run Commands

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use incito_prompt::VariableValue;

use crate::models::response::CommandResponse;
use crate::models::run::{ComparisonEvent, RunContext, RunRecord};
use crate::services::run_mode::RunModeController;
use crate::services::runs::ExecutedRun;
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

/// Execute a stored prompt on every configured provider
pub async fn execute_run(
    state: &AppState,
    prompt_id: &str,
    values: HashMap<String, VariableValue>,
    token: &CancellationToken,
    events: Option<&mpsc::UnboundedSender<ComparisonEvent>>,
) -> CommandResponse<ExecutedRun> {
    let result: AppResult<ExecutedRun> = async {
        let prompt = state
            .with_database(|db| db.get_prompt(prompt_id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("prompt {}", prompt_id)))?;
        let service = state.run_service().await?;
        service.execute(&prompt, &values, None, token, events).await
    }
    .await;
    result.into()
}

/// Execute the prompt of a finished run-mode session with the values it
/// collected; outputs are graded and stored like any other run
pub async fn execute_run_mode(
    state: &AppState,
    controller: &RunModeController,
    token: &CancellationToken,
    events: Option<&mpsc::UnboundedSender<ComparisonEvent>>,
) -> CommandResponse<ExecutedRun> {
    let result: AppResult<ExecutedRun> = async {
        let (prompt, values) = controller.finished_session().await?;
        info!("[Runs] executing run-mode values for prompt {}", prompt.id);
        let service = state.run_service().await?;
        service.execute(&prompt, &values, None, token, events).await
    }
    .await;
    result.into()
}

/// Reopen a past run with its variables and the prompt list
pub async fn get_run_context(state: &AppState, run_id: &str) -> CommandResponse<RunContext> {
    let result: AppResult<RunContext> = async {
        let service = state.run_service().await?;
        service.load_run_context(run_id).await
    }
    .await;
    result.into()
}

/// Runs of a prompt, newest first
pub async fn list_runs(state: &AppState, prompt_id: &str) -> CommandResponse<Vec<RunRecord>> {
    state
        .with_database(|db| db.list_runs_for_prompt(prompt_id))
        .await
        .into()
}
