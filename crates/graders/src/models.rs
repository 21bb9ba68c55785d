//! Grader Models
//!
//! Graders come in two kinds, discriminated by an explicit `kind` field:
//! rule-based assertions and model-based LLM judges.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraderError {
    /// The assertion definition itself is unusable (bad regex, bad length)
    #[error("Invalid assertion: {0}")]
    InvalidAssertion(String),

    /// The judge endpoint answered with an error
    #[error("{0}")]
    Judge(String),

    #[error("Judge request failed: {0}")]
    Network(String),

    #[error("Failed to persist grader results: {0}")]
    Persist(String),
}

pub type GradingResult<T> = Result<T, GraderError>;

// ============================================================================
// Grader definitions
// ============================================================================

/// A configured grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grader {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub is_builtin: bool,
    #[serde(flatten)]
    pub kind: GraderKind,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraderKind {
    Assertion { logic: AssertionLogic },
    LlmJudge { config: LlmJudgeConfig },
}

impl Grader {
    pub fn assertion(id: impl Into<String>, name: impl Into<String>, logic: AssertionLogic) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            enabled: true,
            is_builtin: false,
            kind: GraderKind::Assertion { logic },
        }
    }

    pub fn llm_judge(id: impl Into<String>, name: impl Into<String>, config: LlmJudgeConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            enabled: true,
            is_builtin: false,
            kind: GraderKind::LlmJudge { config },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionOperator {
    Contains,
    NotContains,
    Equals,
    StartsWith,
    EndsWith,
    Regex,
    MinLength,
    MaxLength,
    JsonValid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionLogic {
    pub operator: AssertionOperator,
    /// Needle, pattern or length; unused by `json_valid`
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl AssertionLogic {
    pub fn new(operator: AssertionOperator, value: impl Into<serde_json::Value>) -> Self {
        Self {
            operator,
            value: value.into(),
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmJudgeConfig {
    pub provider_id: String,
    /// Template with `{{input}}` and `{{output}}` placeholders
    pub prompt_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub output_schema: serde_json::Value,
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one grader against one (input, output) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraderResult {
    pub grader_id: String,
    pub score: f64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f64>,
    pub execution_time_ms: u64,
}

impl GraderResult {
    /// Zero-score failure carrying the error text.
    pub fn error(grader_id: &str, error: &GraderError, execution_time_ms: u64) -> Self {
        Self {
            grader_id: grader_id.to_string(),
            score: 0.0,
            passed: false,
            reason: Some(format!("Error: {}", error)),
            raw_score: None,
            execution_time_ms,
        }
    }
}

/// Aggregate over a batch of results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingSummary {
    pub total: usize,
    pub passed: usize,
    pub average_score: f64,
}

impl GradingSummary {
    pub fn from_results(results: &[GraderResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let average_score = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.score).sum::<f64>() / total as f64
        };
        Self {
            total,
            passed,
            average_score,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}
