//! Run-Mode Tool Definitions

use serde_json::json;

use incito_llm::types::ToolDefinition;

pub const DISPLAY_FIELD: &str = "displayField";
pub const COMPLETE_FIELD: &str = "completeField";
pub const ASK_FOLLOW_UP: &str = "askFollowUp";
pub const FINISH_RUN: &str = "finishRun";

/// All tools available during run mode, in a stable order.
pub fn run_mode_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: DISPLAY_FIELD.to_string(),
            description: "Show an input control so the user can fill in one variable. \
                          Use this when you need the user to provide the value."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "variableKey": {
                        "type": "string",
                        "description": "Key of the variable to display"
                    },
                    "message": {
                        "type": "string",
                        "description": "Short question or guidance shown next to the field"
                    }
                },
                "required": ["variableKey"]
            }),
        },
        ToolDefinition {
            name: COMPLETE_FIELD.to_string(),
            description: "Record the final value of a variable once it is known from the conversation."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "variableKey": {
                        "type": "string",
                        "description": "Key of the variable being completed"
                    },
                    "value": {
                        "description": "Value matching the variable type: string, number, or array of strings",
                        "anyOf": [
                            { "type": "string" },
                            { "type": "number" },
                            { "type": "array", "items": { "type": "string" } }
                        ]
                    }
                },
                "required": ["variableKey", "value"]
            }),
        },
        ToolDefinition {
            name: ASK_FOLLOW_UP.to_string(),
            description: "Ask a clarifying question about a field before completing it.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "relatedField": {
                        "type": "string",
                        "description": "Key of the variable the question is about"
                    },
                    "question": {
                        "type": "string",
                        "description": "The follow-up question"
                    }
                },
                "required": ["relatedField", "question"]
            }),
        },
        ToolDefinition {
            name: FINISH_RUN.to_string(),
            description: "Call once every required variable has a value.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Optional one-line summary for the user"
                    }
                }
            }),
        },
    ]
}
