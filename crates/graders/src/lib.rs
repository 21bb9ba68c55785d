//! Incito Graders
//!
//! Scores generated outputs:
//!
//! - `models` - `Grader` (tagged assertion / LLM-judge kinds), `GraderResult`, `GraderError`
//! - `assertion` - pure assertion checks (contains, regex, length, JSON validity, ...)
//! - `judge` - `JudgeClient` trait and the HTTP judge endpoint client
//! - `executor` - `GraderExecutor` (parallel assertions, sequential judges) and `GraderResultSink`
//! - `builtin` - graders shipped with every installation
//!
//! SQLite persistence of results lives in the main crate's storage module.

pub mod assertion;
pub mod builtin;
pub mod executor;
pub mod judge;
pub mod models;

pub use assertion::{evaluate, AssertionOutcome};
pub use builtin::builtin_graders;
pub use executor::{GraderExecutor, GraderResultSink};
pub use judge::{HttpJudgeClient, JudgeClient};
pub use models::{
    AssertionLogic, AssertionOperator, Grader, GraderError, GraderKind, GraderResult,
    GradingResult, GradingSummary, LlmJudgeConfig,
};
