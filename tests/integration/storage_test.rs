//! Storage Integration Tests
//!
//! File-backed SQLite through `Database::open`:
//! - data survives reopening the file
//! - deleting a run cascades to its variables and grader results
//! - batch listing and missing-row errors

use std::collections::HashMap;

use tempfile::TempDir;

use incito_desktop::models::prompt::PromptDocument;
use incito_desktop::models::run::{ProviderRunResult, RunRecord, RunStatus};
use incito_desktop::storage::database::Database;
use incito_desktop::AppError;
use incito_graders::{GraderResult, GraderResultSink};
use incito_prompt::VariableValue;

fn grader_result(id: &str, passed: bool) -> GraderResult {
    GraderResult {
        grader_id: id.to_string(),
        score: if passed { 1.0 } else { 0.0 },
        passed,
        reason: None,
        raw_score: None,
        execution_time_ms: 3,
    }
}

fn completed(record: &mut RunRecord, output: &str) {
    let mut result = ProviderRunResult::new(record.provider_id.clone());
    result.status = RunStatus::Completed;
    result.output = output.to_string();
    result.duration_ms = 42;
    record.finish(&result);
}

#[test]
fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("incito.db");

    let run_id = {
        let db = Database::open(&path).unwrap();
        db.seed_builtin_graders().unwrap();
        db.upsert_prompt(&PromptDocument::new("p1", "Greeting", "Hello {{name}}"))
            .unwrap();

        let mut run = RunRecord::started("batch-1", Some("p1".to_string()), "claude", "Hello Ada");
        db.insert_run(&run).unwrap();
        db.save_run_variables(
            &run.id,
            &HashMap::from([("name".to_string(), VariableValue::from("Ada"))]),
        )
        .unwrap();
        completed(&mut run, "Hi!");
        db.update_run(&run).unwrap();
        db.save_grader_results(&run.id, &[grader_result("builtin-not-empty", true)])
            .unwrap();
        run.id
    };

    let db = Database::open(&path).unwrap();
    assert_eq!(db.seed_builtin_graders().unwrap(), 0);

    let prompt = db.get_prompt("p1").unwrap().unwrap();
    assert_eq!(prompt.variables.len(), 1);
    assert_eq!(prompt.variables[0].key, "name");

    let run = db.get_run(&run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output.as_deref(), Some("Hi!"));
    assert_eq!(run.duration_ms, Some(42));
    assert!(run.completed_at.is_some());

    assert_eq!(
        db.get_run_variables(&run_id).unwrap()["name"],
        VariableValue::from("Ada")
    );
    assert_eq!(db.get_grader_results(&run_id).unwrap().len(), 1);
}

#[test]
fn test_delete_run_cascades() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("incito.db")).unwrap();

    let run = RunRecord::started("batch-1", None, "claude", "prompt text");
    db.insert_run(&run).unwrap();
    db.save_run_variables(
        &run.id,
        &HashMap::from([
            ("items".to_string(), VariableValue::from(vec!["a", "b"])),
            ("count".to_string(), VariableValue::Number(2.0)),
        ]),
    )
    .unwrap();
    db.insert_grader_results(
        &run.id,
        &[grader_result("g1", true), grader_result("g2", false)],
    )
    .unwrap();

    let variables = db.get_run_variables(&run.id).unwrap();
    assert_eq!(variables["items"], VariableValue::from(vec!["a", "b"]));
    assert_eq!(variables["count"], VariableValue::Number(2.0));

    assert!(db.delete_run(&run.id).unwrap());
    assert!(db.get_run(&run.id).unwrap().is_none());
    assert!(db.get_run_variables(&run.id).unwrap().is_empty());
    assert!(db.get_grader_results(&run.id).unwrap().is_empty());
    assert!(!db.delete_run(&run.id).unwrap());
}

#[test]
fn test_batch_listing_and_missing_run_update() {
    let db = Database::new_in_memory().unwrap();

    for provider in ["opus", "claude", "haiku"] {
        db.insert_run(&RunRecord::started("batch-7", None, provider, "x"))
            .unwrap();
    }
    db.insert_run(&RunRecord::started("batch-8", None, "claude", "y"))
        .unwrap();

    let batch: Vec<String> = db
        .list_runs_for_batch("batch-7")
        .unwrap()
        .into_iter()
        .map(|r| r.provider_id)
        .collect();
    assert_eq!(batch, vec!["claude", "haiku", "opus"]);

    let ghost = RunRecord::started("batch-9", None, "claude", "z");
    assert!(matches!(db.update_run(&ghost), Err(AppError::NotFound(_))));
}
