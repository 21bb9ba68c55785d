//! Built-in graders shipped with every installation.

use crate::models::{AssertionLogic, AssertionOperator, Grader};

pub const NOT_EMPTY_ID: &str = "builtin-not-empty";
pub const VALID_JSON_ID: &str = "builtin-valid-json";
pub const MAX_LENGTH_ID: &str = "builtin-max-length-2000";

pub fn builtin_graders() -> Vec<Grader> {
    vec![
        builtin(
            NOT_EMPTY_ID,
            "Not empty",
            "Output contains at least one character",
            AssertionLogic::new(AssertionOperator::MinLength, 1),
        ),
        builtin(
            VALID_JSON_ID,
            "Valid JSON",
            "Output parses as JSON",
            AssertionLogic::new(AssertionOperator::JsonValid, serde_json::Value::Null),
        ),
        builtin(
            MAX_LENGTH_ID,
            "Max 2000 characters",
            "Output is at most 2000 characters long",
            AssertionLogic::new(AssertionOperator::MaxLength, 2000),
        ),
    ]
}

fn builtin(id: &str, name: &str, description: &str, logic: AssertionLogic) -> Grader {
    let mut grader = Grader::assertion(id, name, logic);
    grader.description = Some(description.to_string());
    grader.is_builtin = true;
    grader
}
