//! Run Mode Types
//!
//! State, events and errors of the guided value-collection conversation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use incito_llm::{LlmError, MessageRole};
use incito_prompt::{Variable, VariableValue};

use crate::models::prompt::PromptDocument;

/// Lifecycle phase of a run-mode session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunModePhase {
    #[default]
    Idle,
    /// Active, still collecting values
    Collecting,
    /// Active, the model called `finishRun`
    Finished,
}

impl RunModePhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, RunModePhase::Idle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModeMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: String,
}

impl RunModeMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Completed vs. total required fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunModeProgress {
    pub completed: usize,
    pub total: usize,
}

/// Mutable state of one run-mode session.
#[derive(Debug, Clone, Default)]
pub struct RunModeState {
    /// Changes on every start/exit; turns from an older session are discarded
    pub session_id: String,
    pub phase: RunModePhase,
    pub prompt: Option<PromptDocument>,
    pub custom_instructions: Option<String>,
    pub messages: Vec<RunModeMessage>,
    pub values: HashMap<String, VariableValue>,
    /// Completed keys in completion order, without duplicates
    pub completed_fields: Vec<String>,
    pub displayed_field: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl RunModeState {
    /// Fresh collecting state for `prompt`.
    pub fn started(prompt: PromptDocument, custom_instructions: Option<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            phase: RunModePhase::Collecting,
            prompt: Some(prompt),
            custom_instructions: custom_instructions.filter(|s| !s.trim().is_empty()),
            ..Default::default()
        }
    }

    pub fn variables(&self) -> &[Variable] {
        self.prompt
            .as_ref()
            .map(|p| p.variables.as_slice())
            .unwrap_or(&[])
    }

    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.variables().iter().find(|v| v.key == key)
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed_fields.iter().any(|k| k == key)
    }

    /// Record a value and mark the field completed.
    ///
    /// Returns false when the field was already completed.
    pub fn complete_field(&mut self, key: &str, value: VariableValue) -> bool {
        self.values.insert(key.to_string(), value);
        if self.displayed_field.as_deref() == Some(key) {
            self.displayed_field = None;
        }
        if self.is_completed(key) {
            return false;
        }
        self.completed_fields.push(key.to_string());
        true
    }

    /// Variables not completed yet, in definition order
    pub fn remaining_fields(&self) -> Vec<&Variable> {
        self.variables()
            .iter()
            .filter(|v| !self.is_completed(&v.key))
            .collect()
    }

    pub fn progress(&self) -> RunModeProgress {
        let required: Vec<&Variable> = self.variables().iter().filter(|v| v.required).collect();
        RunModeProgress {
            completed: required.iter().filter(|v| self.is_completed(&v.key)).count(),
            total: required.len(),
        }
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut RunModeMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Remove a message by id; returns whether it existed.
    pub fn remove_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn snapshot(&self) -> RunModeSnapshot {
        RunModeSnapshot {
            phase: self.phase,
            prompt_id: self.prompt.as_ref().map(|p| p.id.clone()),
            messages: self.messages.clone(),
            values: self.values.clone(),
            completed_fields: self.completed_fields.clone(),
            displayed_field: self.displayed_field.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            progress: self.progress(),
        }
    }
}

/// Read-only view for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModeSnapshot {
    pub phase: RunModePhase,
    pub prompt_id: Option<String>,
    pub messages: Vec<RunModeMessage>,
    pub values: HashMap<String, VariableValue>,
    pub completed_fields: Vec<String>,
    pub displayed_field: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub progress: RunModeProgress,
}

/// Notifications for a UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunModeEvent {
    MessageAppended { message: RunModeMessage },
    MessageUpdated { id: String, content: String },
    MessageRemoved { id: String },
    FieldDisplayed { key: String },
    FieldCompleted { key: String, value: VariableValue },
    Finished,
    Error { message: String },
}

/// Result of one model turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    pub text: String,
    /// Tool calls applied, in emission order
    pub tool_calls: Vec<incito_tools::RunModeToolCall>,
    pub cancelled: bool,
}

#[derive(Error, Debug)]
pub enum RunModeError {
    #[error("Run mode is not active")]
    NotActive,

    #[error("A model response is already in progress")]
    TurnInFlight,

    #[error("Run mode has not finished collecting values")]
    NotFinished,

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid tool call: {0}")]
    ToolCall(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Generation cancelled")]
    Cancelled,
}

impl RunModeError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Llm(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type RunModeResult<T> = Result<T, RunModeError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunModeState {
        let mut prompt = PromptDocument::new("p1", "Email", "{{recipient}} {{topic}} {{tone}}");
        prompt.variables[0].required = true;
        prompt.variables[1].required = true;
        RunModeState::started(prompt, Some("  ".to_string()))
    }

    #[test]
    fn test_started_state() {
        let state = state();
        assert_eq!(state.phase, RunModePhase::Collecting);
        assert!(state.custom_instructions.is_none());
        assert_eq!(state.progress(), RunModeProgress { completed: 0, total: 2 });
    }

    #[test]
    fn test_complete_field_is_idempotent() {
        let mut state = state();
        state.displayed_field = Some("topic".to_string());

        assert!(state.complete_field("topic", "pricing".into()));
        assert!(state.displayed_field.is_none());
        assert!(!state.complete_field("topic", "refunds".into()));

        assert_eq!(state.completed_fields, vec!["topic"]);
        assert_eq!(state.values["topic"], VariableValue::from("refunds"));
        assert_eq!(state.progress().completed, 1);
        let remaining: Vec<&str> = state.remaining_fields().iter().map(|v| v.key.as_str()).collect();
        assert_eq!(remaining, vec!["recipient", "tone"]);
    }

    #[test]
    fn test_complete_keeps_other_displayed_field() {
        let mut state = state();
        state.displayed_field = Some("tone".to_string());
        state.complete_field("topic", "pricing".into());
        assert_eq!(state.displayed_field.as_deref(), Some("tone"));
    }

    #[test]
    fn test_error_cancel_predicate() {
        assert!(RunModeError::Cancelled.is_cancelled());
        assert!(RunModeError::Llm(LlmError::Cancelled).is_cancelled());
        assert!(!RunModeError::TurnInFlight.is_cancelled());
    }
}
