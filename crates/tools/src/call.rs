//! Run-Mode Tool Calls
//!
//! Parses a completed tool call (name + accumulated JSON arguments) into a
//! typed `RunModeToolCall`. Unknown tool names are `CoreError::NotFound`;
//! arguments that are not valid JSON or miss a required parameter are
//! `CoreError::Parse`.

use serde::Deserialize;

use crate::definitions::{ASK_FOLLOW_UP, COMPLETE_FIELD, DISPLAY_FIELD, FINISH_RUN};
use incito_core::{CoreError, CoreResult};
use incito_prompt::VariableValue;

#[derive(Debug, Clone, PartialEq)]
pub enum RunModeToolCall {
    DisplayField {
        variable_key: String,
        message: Option<String>,
    },
    CompleteField {
        variable_key: String,
        value: VariableValue,
    },
    AskFollowUp {
        related_field: String,
        question: String,
    },
    FinishRun {
        summary: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayFieldArgs {
    variable_key: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteFieldArgs {
    variable_key: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskFollowUpArgs {
    related_field: String,
    #[serde(default)]
    question: String,
}

#[derive(Deserialize, Default)]
struct FinishRunArgs {
    #[serde(default)]
    summary: Option<String>,
}

impl RunModeToolCall {
    pub fn parse(name: &str, arguments: &str) -> CoreResult<Self> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };

        match name {
            DISPLAY_FIELD => {
                let args: DisplayFieldArgs = parse_args(name, arguments)?;
                Ok(Self::DisplayField {
                    variable_key: args.variable_key,
                    message: args.message,
                })
            }
            COMPLETE_FIELD => {
                let args: CompleteFieldArgs = parse_args(name, arguments)?;
                Ok(Self::CompleteField {
                    variable_key: args.variable_key,
                    value: value_from_json(args.value)?,
                })
            }
            ASK_FOLLOW_UP => {
                let args: AskFollowUpArgs = parse_args(name, arguments)?;
                Ok(Self::AskFollowUp {
                    related_field: args.related_field,
                    question: args.question,
                })
            }
            FINISH_RUN => {
                let args: FinishRunArgs = parse_args(name, arguments)?;
                Ok(Self::FinishRun {
                    summary: args.summary,
                })
            }
            other => Err(CoreError::not_found(format!("Unknown tool: {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DisplayField { .. } => DISPLAY_FIELD,
            Self::CompleteField { .. } => COMPLETE_FIELD,
            Self::AskFollowUp { .. } => ASK_FOLLOW_UP,
            Self::FinishRun { .. } => FINISH_RUN,
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, arguments: &str) -> CoreResult<T> {
    serde_json::from_str(arguments)
        .map_err(|e| CoreError::parse(format!("Invalid arguments for {}: {}", tool, e)))
}

/// Models send strings, numbers, arrays, and occasionally booleans.
fn value_from_json(value: serde_json::Value) -> CoreResult<VariableValue> {
    use serde_json::Value;

    match value {
        Value::String(s) => Ok(VariableValue::Text(s)),
        Value::Number(n) => n
            .as_f64()
            .map(VariableValue::Number)
            .ok_or_else(|| CoreError::parse(format!("Unsupported number: {}", n))),
        Value::Bool(b) => Ok(VariableValue::Text(b.to_string())),
        Value::Array(items) => Ok(VariableValue::List(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        )),
        Value::Null => Err(CoreError::parse("completeField value must not be null")),
        Value::Object(_) => Err(CoreError::parse("completeField value must not be an object")),
    }
}
