//! Grader Executor
//!
//! Runs a grader selection against one candidate output:
//! 1. Assertion graders as one concurrent batch (`join_all`)
//! 2. LLM-judge graders one after another, to stay under provider rate limits
//!
//! Each grader is isolated: a failure becomes a zero-score result instead of
//! aborting the batch. Results are returned assertions first (selection
//! order), then judges (completion order).

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::assertion::evaluate;
use crate::judge::JudgeClient;
use crate::models::{AssertionLogic, Grader, GraderKind, GraderResult, GradingResult};

// ============================================================================
// Result Sink Trait
// ============================================================================

/// Persists grader results for a run.
///
/// Writes may block; the executor calls them on the blocking thread pool.
/// The main crate provides a SQLite-backed implementation.
pub trait GraderResultSink: Send + Sync {
    fn save_grader_results(&self, run_id: &str, results: &[GraderResult]) -> GradingResult<()>;
}

// ============================================================================
// Executor
// ============================================================================

pub struct GraderExecutor {
    judge: Arc<dyn JudgeClient>,
    sink: Option<Arc<dyn GraderResultSink>>,
}

impl GraderExecutor {
    pub fn new(judge: Arc<dyn JudgeClient>) -> Self {
        Self { judge, sink: None }
    }

    /// Persist results whenever a run id is supplied.
    pub fn with_sink(mut self, sink: Arc<dyn GraderResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the enabled graders of `graders` against `output`.
    pub async fn run_graders(
        &self,
        graders: &[Grader],
        input: &str,
        output: &str,
        run_id: Option<&str>,
    ) -> Vec<GraderResult> {
        let mut assertions: Vec<(&Grader, &AssertionLogic)> = Vec::new();
        let mut judges: Vec<&Grader> = Vec::new();
        for grader in graders.iter().filter(|g| g.enabled) {
            match &grader.kind {
                GraderKind::Assertion { logic } => assertions.push((grader, logic)),
                GraderKind::LlmJudge { .. } => judges.push(grader),
            }
        }

        debug!(
            "[Graders] running {} assertion and {} judge grader(s)",
            assertions.len(),
            judges.len()
        );

        let mut results = join_all(
            assertions
                .into_iter()
                .map(|(grader, logic)| async move { run_assertion(grader, logic, output) }),
        )
        .await;

        for grader in judges {
            let started = Instant::now();
            let result = match self.judge.run_llm_judge(grader, input, output).await {
                Ok(mut result) => {
                    if result.execution_time_ms == 0 {
                        result.execution_time_ms = elapsed_ms(started);
                    }
                    result
                }
                Err(e) => {
                    warn!("[Graders] judge {} failed: {}", grader.id, e);
                    GraderResult::error(&grader.id, &e, elapsed_ms(started))
                }
            };
            results.push(result);
        }

        if let (Some(run_id), Some(sink)) = (run_id, &self.sink) {
            if !results.is_empty() {
                persist(sink.clone(), run_id, &results).await;
            }
        }

        results
    }
}

async fn persist(sink: Arc<dyn GraderResultSink>, run_id: &str, results: &[GraderResult]) {
    let owned_id = run_id.to_string();
    let owned = results.to_vec();
    let saved =
        tokio::task::spawn_blocking(move || sink.save_grader_results(&owned_id, &owned)).await;
    match saved {
        Ok(Ok(())) => debug!("[Graders] saved {} result(s) for run {}", results.len(), run_id),
        Ok(Err(e)) => warn!("[Graders] could not save results for run {}: {}", run_id, e),
        Err(e) => warn!("[Graders] result writer for run {} failed: {}", run_id, e),
    }
}

fn run_assertion(grader: &Grader, logic: &AssertionLogic, output: &str) -> GraderResult {
    let started = Instant::now();
    match evaluate(logic, output) {
        Ok(outcome) => GraderResult {
            grader_id: grader.id.clone(),
            score: outcome.score(),
            passed: outcome.passed,
            reason: Some(outcome.reason),
            raw_score: outcome.raw_score,
            execution_time_ms: elapsed_ms(started),
        },
        Err(e) => {
            warn!("[Graders] assertion {} failed: {}", grader.id, e);
            GraderResult::error(&grader.id, &e, elapsed_ms(started))
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
