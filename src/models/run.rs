//! Run Models
//!
//! A run is one provider's execution of a rendered prompt. Runs started
//! together by a comparison share a `batch_id`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use incito_graders::GraderResult;
use incito_llm::UsageStats;
use incito_prompt::VariableValue;

use super::prompt::PromptDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Persisted run row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    pub batch_id: String,
    pub prompt_id: Option<String>,
    pub provider_id: String,
    pub model: Option<String>,
    pub status: RunStatus,
    pub rendered_prompt: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub usage: Option<UsageStats>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl RunRecord {
    /// A fresh `running` record.
    pub fn started(
        batch_id: impl Into<String>,
        prompt_id: Option<String>,
        provider_id: impl Into<String>,
        rendered_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.into(),
            prompt_id,
            provider_id: provider_id.into(),
            model: None,
            status: RunStatus::Running,
            rendered_prompt: rendered_prompt.into(),
            output: None,
            error: None,
            duration_ms: None,
            usage: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Copy the outcome of a provider execution onto this record.
    pub fn finish(&mut self, result: &ProviderRunResult) {
        self.status = result.status;
        self.model = result.model.clone().or_else(|| self.model.take());
        self.output = Some(result.output.clone());
        self.error = result.error.clone();
        self.duration_ms = Some(result.duration_ms);
        self.usage = result.usage;
        self.completed_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

/// Outcome of one provider in a comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRunResult {
    pub provider_id: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub status: RunStatus,
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub usage: Option<UsageStats>,
    #[serde(default)]
    pub grader_results: Vec<GraderResult>,
}

impl ProviderRunResult {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            run_id: None,
            model: None,
            status: RunStatus::Running,
            output: String::new(),
            error: None,
            duration_ms: 0,
            usage: None,
            grader_results: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Events emitted while a comparison streams
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonEvent {
    Delta { provider_id: String, content: String },
    Finished { provider_id: String, status: RunStatus },
}

/// Everything needed to reopen a past run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run: RunRecord,
    pub variables: HashMap<String, VariableValue>,
    pub prompts: Vec<PromptDocument>,
}

impl RunContext {
    /// The prompt the run was executed from, if it still exists.
    pub fn prompt(&self) -> Option<&PromptDocument> {
        let id = self.run.prompt_id.as_deref()?;
        self.prompts.iter().find(|p| p.id == id)
    }
}
