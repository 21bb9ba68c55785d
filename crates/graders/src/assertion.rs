//! Assertion Evaluation
//!
//! Pure checks of a candidate output against an `AssertionLogic`. Lengths
//! are counted in characters. Text comparisons are case-insensitive unless
//! `case_sensitive` is set.

use regex::RegexBuilder;

use crate::models::{AssertionLogic, AssertionOperator, GraderError, GradingResult};

/// Verdict of a single assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionOutcome {
    pub passed: bool,
    pub reason: String,
    /// Measured quantity, for length checks
    pub raw_score: Option<f64>,
}

impl AssertionOutcome {
    fn new(passed: bool, reason: String) -> Self {
        Self {
            passed,
            reason,
            raw_score: None,
        }
    }

    pub fn score(&self) -> f64 {
        if self.passed {
            1.0
        } else {
            0.0
        }
    }
}

pub fn evaluate(logic: &AssertionLogic, output: &str) -> GradingResult<AssertionOutcome> {
    match logic.operator {
        AssertionOperator::Contains => {
            let needle = text_value(logic)?;
            let found = fold(output, logic).contains(&fold(&needle, logic));
            Ok(AssertionOutcome::new(
                found,
                if found {
                    format!("Output contains \"{}\"", needle)
                } else {
                    format!("Output does not contain \"{}\"", needle)
                },
            ))
        }
        AssertionOperator::NotContains => {
            let needle = text_value(logic)?;
            let found = fold(output, logic).contains(&fold(&needle, logic));
            Ok(AssertionOutcome::new(
                !found,
                if found {
                    format!("Output contains forbidden text \"{}\"", needle)
                } else {
                    format!("Output does not contain \"{}\"", needle)
                },
            ))
        }
        AssertionOperator::Equals => {
            let expected = text_value(logic)?;
            let equal = fold(output.trim(), logic) == fold(expected.trim(), logic);
            Ok(AssertionOutcome::new(
                equal,
                if equal {
                    "Output matches expected value".to_string()
                } else {
                    format!("Output does not equal \"{}\"", expected)
                },
            ))
        }
        AssertionOperator::StartsWith => {
            let prefix = text_value(logic)?;
            let ok = fold(output.trim_start(), logic).starts_with(&fold(&prefix, logic));
            Ok(AssertionOutcome::new(
                ok,
                format!(
                    "Output {} with \"{}\"",
                    if ok { "starts" } else { "does not start" },
                    prefix
                ),
            ))
        }
        AssertionOperator::EndsWith => {
            let suffix = text_value(logic)?;
            let ok = fold(output.trim_end(), logic).ends_with(&fold(&suffix, logic));
            Ok(AssertionOutcome::new(
                ok,
                format!(
                    "Output {} with \"{}\"",
                    if ok { "ends" } else { "does not end" },
                    suffix
                ),
            ))
        }
        AssertionOperator::Regex => {
            let pattern = text_value(logic)?;
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(!logic.case_sensitive)
                .build()
                .map_err(|e| GraderError::InvalidAssertion(format!("bad regex /{}/: {}", pattern, e)))?;
            let matched = re.is_match(output);
            Ok(AssertionOutcome::new(
                matched,
                format!(
                    "Output {} /{}/",
                    if matched { "matches" } else { "does not match" },
                    pattern
                ),
            ))
        }
        AssertionOperator::MinLength | AssertionOperator::MaxLength => {
            let limit = length_value(logic)?;
            let length = output.chars().count();
            let passed = if logic.operator == AssertionOperator::MinLength {
                length >= limit
            } else {
                length <= limit
            };
            let bound = if logic.operator == AssertionOperator::MinLength {
                "minimum"
            } else {
                "maximum"
            };
            Ok(AssertionOutcome {
                passed,
                reason: format!("Output length {} vs {} {}", length, bound, limit),
                raw_score: Some(length as f64),
            })
        }
        AssertionOperator::JsonValid => {
            match serde_json::from_str::<serde_json::Value>(output.trim()) {
                Ok(_) => Ok(AssertionOutcome::new(true, "Output is valid JSON".to_string())),
                Err(e) => Ok(AssertionOutcome::new(
                    false,
                    format!("Output is not valid JSON: {}", e),
                )),
            }
        }
    }
}

fn fold(text: &str, logic: &AssertionLogic) -> String {
    if logic.case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

fn text_value(logic: &AssertionLogic) -> GradingResult<String> {
    match &logic.value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(GraderError::InvalidAssertion(format!(
            "{:?} needs a text value, got {}",
            logic.operator, other
        ))),
    }
}

fn length_value(logic: &AssertionLogic) -> GradingResult<usize> {
    let parsed = match &logic.value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(|n| n as usize)
        .ok_or_else(|| GraderError::InvalidAssertion(format!("invalid length: {}", logic.value)))
}
