//! Prompt Document Models
//!
//! A prompt is a template plus its typed variables and the graders selected
//! to score its outputs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use incito_prompt::{extract_variable_keys, interpolate, sync_variables, Variable, VariableValue};

use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub template: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// Ids of the graders run against this prompt's outputs
    #[serde(default)]
    pub grader_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl PromptDocument {
    /// New prompt whose variables are derived from the template.
    pub fn new(id: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = sync_variables(&template, &[]);
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            template,
            variables,
            grader_ids: Vec::new(),
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Replace the template and reconcile the variable list with it.
    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
        self.variables = sync_variables(&self.template, &self.variables);
    }

    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.key == key)
    }

    pub fn render(&self, values: &HashMap<String, VariableValue>) -> String {
        interpolate(&self.template, values, &self.variables)
    }

    /// Values pre-filled from variable defaults.
    pub fn default_values(&self) -> HashMap<String, VariableValue> {
        self.variables
            .iter()
            .filter_map(|v| v.default.clone().map(|d| (v.key.clone(), d)))
            .collect()
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Prompt name must not be empty"));
        }
        if self.template.trim().is_empty() {
            return Err(AppError::validation("Prompt template must not be empty"));
        }

        let mut seen = HashSet::new();
        for variable in &self.variables {
            variable.validate()?;
            if !seen.insert(variable.key.as_str()) {
                return Err(AppError::validation(format!(
                    "Duplicate variable key: {}",
                    variable.key
                )));
            }
        }

        if let Some(missing) = extract_variable_keys(&self.template)
            .into_iter()
            .find(|key| !seen.contains(key.as_str()))
        {
            return Err(AppError::validation(format!(
                "Template uses {{{{{}}}}} but no variable defines it",
                missing
            )));
        }
        Ok(())
    }
}
