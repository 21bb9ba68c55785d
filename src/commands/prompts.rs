//! Prompt Commands
//!
//! CRUD for prompt documents plus rendering.

use std::collections::HashMap;

use incito_prompt::VariableValue;

use crate::models::prompt::PromptDocument;
use crate::models::response::CommandResponse;
use crate::state::AppState;
use crate::utils::error::AppError;

/// List all prompts ordered by name
pub async fn list_prompts(state: &AppState) -> CommandResponse<Vec<PromptDocument>> {
    state.with_database(|db| db.list_prompts()).await.into()
}

pub async fn get_prompt(state: &AppState, id: &str) -> CommandResponse<PromptDocument> {
    state
        .with_database(|db| {
            db.get_prompt(id)?
                .ok_or_else(|| AppError::not_found(format!("prompt {}", id)))
        })
        .await
        .into()
}

/// Create or update a prompt; variables are re-synchronized with the template first
pub async fn save_prompt(state: &AppState, mut prompt: PromptDocument) -> CommandResponse<PromptDocument> {
    prompt.set_template(prompt.template.clone());
    state
        .with_database(|db| {
            db.upsert_prompt(&prompt)?;
            db.get_prompt(&prompt.id)?
                .ok_or_else(|| AppError::internal("prompt vanished after save"))
        })
        .await
        .into()
}

pub async fn delete_prompt(state: &AppState, id: &str) -> CommandResponse<bool> {
    state.with_database(|db| db.delete_prompt(id)).await.into()
}

/// Interpolate a stored prompt with the given values
pub async fn render_prompt(
    state: &AppState,
    id: &str,
    values: &HashMap<String, VariableValue>,
) -> CommandResponse<String> {
    state
        .with_database(|db| {
            let prompt = db
                .get_prompt(id)?
                .ok_or_else(|| AppError::not_found(format!("prompt {}", id)))?;
            Ok(prompt.render(values))
        })
        .await
        .into()
}
