//! Grader Commands

use std::sync::Arc;

use incito_graders::{Grader, GraderExecutor, GraderResult, HttpJudgeClient};

use crate::models::response::CommandResponse;
use crate::state::AppState;
use crate::utils::error::AppResult;

/// List graders, built-ins first
pub async fn list_graders(state: &AppState) -> CommandResponse<Vec<Grader>> {
    state.with_database(|db| db.list_graders()).await.into()
}

pub async fn save_grader(state: &AppState, grader: Grader) -> CommandResponse<Grader> {
    state
        .with_database(|db| {
            db.upsert_grader(&grader)?;
            Ok(grader)
        })
        .await
        .into()
}

/// Delete a user grader (refuses built-ins)
pub async fn delete_grader(state: &AppState, id: &str) -> CommandResponse<bool> {
    state.with_database(|db| db.delete_grader(id)).await.into()
}

/// Grade one output. Results are stored only when `run_id` is given.
pub async fn run_graders(
    state: &AppState,
    graders: Vec<Grader>,
    input: &str,
    output: &str,
    run_id: Option<&str>,
) -> CommandResponse<Vec<GraderResult>> {
    let result: AppResult<Vec<GraderResult>> = async {
        let config = state.get_config().await?;
        let judge = Arc::new(HttpJudgeClient::new(config.judge_url())?);
        let mut executor = GraderExecutor::new(judge);
        if run_id.is_some() {
            let db = state.with_database(|db| Ok(db.clone())).await?;
            executor = executor.with_sink(Arc::new(db));
        }
        Ok(executor.run_graders(&graders, input, output, run_id).await)
    }
    .await;
    result.into()
}

pub async fn get_grader_results(state: &AppState, run_id: &str) -> CommandResponse<Vec<GraderResult>> {
    state
        .with_database(|db| db.get_grader_results(run_id))
        .await
        .into()
}
