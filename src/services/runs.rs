//! Run Execution Service
//!
//! Executes a prompt across the configured providers, records one run per
//! provider, and grades each completed output against the prompt's graders.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use incito_graders::{GraderExecutor, JudgeClient};
use incito_prompt::{missing_required, VariableValue};

use crate::models::prompt::PromptDocument;
use crate::models::run::{ComparisonEvent, ProviderRunResult, RunContext, RunRecord};
use crate::services::comparison::ComparisonRunner;
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

/// Outcome of `RunService::execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedRun {
    pub batch_id: String,
    pub rendered_prompt: String,
    pub results: HashMap<String, ProviderRunResult>,
}

pub struct RunService {
    db: Database,
    comparison: ComparisonRunner,
    graders: GraderExecutor,
}

impl RunService {
    pub fn new(db: Database, comparison: ComparisonRunner, judge: Arc<dyn JudgeClient>) -> Self {
        let graders = GraderExecutor::new(judge).with_sink(Arc::new(db.clone()));
        Self {
            db,
            comparison,
            graders,
        }
    }

    pub async fn execute(
        &self,
        prompt: &PromptDocument,
        values: &HashMap<String, VariableValue>,
        system: Option<&str>,
        token: &CancellationToken,
        events: Option<&mpsc::UnboundedSender<ComparisonEvent>>,
    ) -> AppResult<ExecutedRun> {
        let missing = missing_required(&prompt.variables, values);
        if !missing.is_empty() {
            return Err(AppError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        let provider_ids = self.comparison.provider_ids();
        if provider_ids.is_empty() {
            return Err(AppError::config("No providers configured"));
        }

        let rendered = prompt.render(values);
        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut records: Vec<RunRecord> = provider_ids
            .iter()
            .map(|id| RunRecord::started(&batch_id, Some(prompt.id.clone()), id, &rendered))
            .collect();

        {
            let records = records.clone();
            let values = values.clone();
            self.blocking(move |db| {
                for record in &records {
                    db.insert_run(record)?;
                    db.save_run_variables(&record.id, &values)?;
                }
                Ok(())
            })
            .await?;
        }

        info!(
            "[Runs] batch {} started on {} provider(s)",
            batch_id,
            records.len()
        );
        let mut results = self.comparison.run(system, &rendered, token, events).await;

        let grader_ids = prompt.grader_ids.clone();
        let graders = self
            .blocking(move |db| db.get_graders_by_ids(&grader_ids))
            .await?;

        for record in &mut records {
            let Some(result) = results.get_mut(&record.provider_id) else {
                continue;
            };
            result.run_id = Some(record.id.clone());
            record.finish(result);

            let update = record.clone();
            self.blocking(move |db| db.update_run(&update)).await?;

            if result.is_completed() && !graders.is_empty() {
                result.grader_results = self
                    .graders
                    .run_graders(&graders, &rendered, &result.output, Some(&record.id))
                    .await;
            }
            debug!(
                "[Runs] {} finished as {:?} with {} grader result(s)",
                record.provider_id,
                record.status,
                result.grader_results.len()
            );
        }

        Ok(ExecutedRun {
            batch_id,
            rendered_prompt: rendered,
            results,
        })
    }

    /// Load a run, its saved variables and the prompt list concurrently.
    pub async fn load_run_context(&self, run_id: &str) -> AppResult<RunContext> {
        let run_key = run_id.to_string();
        let vars_key = run_id.to_string();
        let (run, variables, prompts) = tokio::join!(
            self.blocking(move |db| db.get_run(&run_key)),
            self.blocking(move |db| db.get_run_variables(&vars_key)),
            self.blocking(|db| db.list_prompts()),
        );

        let run = run?.ok_or_else(|| AppError::not_found(format!("run {}", run_id)))?;
        Ok(RunContext {
            run,
            variables: variables?,
            prompts: prompts?,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| AppError::database(format!("Task join error: {}", e)))?
    }
}
