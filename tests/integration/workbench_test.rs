//! Workbench Integration Tests
//!
//! Drives `AppState` through the command layer with the sidecar and the
//! judge endpoint mocked by wiremock:
//! - health report with sidecar authentication
//! - settings updates and validation
//! - prompt CRUD and rendering
//! - comparison runs on two providers, persisted with variables and grades

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use incito_desktop::commands;
use incito_desktop::models::prompt::PromptDocument;
use incito_desktop::models::run::{ComparisonEvent, RunStatus};
use incito_desktop::storage::database::Database;
use incito_desktop::{AppState, SettingsUpdate};
use incito_graders::builtin::NOT_EMPTY_ID;
use incito_graders::{Grader, LlmJudgeConfig};
use incito_prompt::VariableValue;

// ============================================================================
// Helpers
// ============================================================================

async fn create_state(server: &MockServer) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let config_path: PathBuf = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        serde_json::to_string_pretty(&json!({
            "sidecar": { "base_url": server.uri() },
            "providers": [
                { "id": "claude" },
                { "id": "opus", "model": "opus" }
            ]
        }))
        .unwrap(),
    )
    .unwrap();

    let state = AppState::new();
    state
        .initialize_at(config_path, Database::new_in_memory().unwrap())
        .await
        .unwrap();
    (state, dir)
}

fn sse(frames: &[serde_json::Value]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {}\n\n", frame))
        .collect()
}

async fn mount_stream(server: &MockServer, model: Option<&str>, text: &str) {
    let body = sse(&[
        json!({ "type": "text", "content": text }),
        json!({ "type": "done", "usage": { "inputTokens": 4, "outputTokens": 2 } }),
    ]);
    let mut mock = Mock::given(method("POST")).and(path("/stream"));
    if let Some(model) = model {
        mock = mock.and(body_partial_json(json!({ "model": model })));
    }
    mock.respond_with(
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(body),
    )
    .mount(server)
    .await;
}

fn judge_grader() -> Grader {
    Grader::llm_judge(
        "judge-clarity",
        "Clarity",
        LlmJudgeConfig {
            provider_id: "claude".to_string(),
            prompt_template: "Is {{output}} a clear answer to {{input}}?".to_string(),
            system_prompt: None,
            output_schema: serde_json::Value::Null,
        },
    )
}

fn summary_prompt() -> PromptDocument {
    let mut prompt = PromptDocument::new(
        "prompt-summary",
        "Summary",
        "Summarize {{topic}} for {{audience}}.",
    );
    prompt.variables[0].required = true;
    prompt.variables[1].default = Some(VariableValue::from("beginners"));
    prompt.grader_ids = vec![NOT_EMPTY_ID.to_string(), "judge-clarity".to_string()];
    prompt
}

// ============================================================================
// Health and settings
// ============================================================================

#[tokio::test]
async fn test_health_reports_sidecar_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth-status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "authenticated": true, "model": "sonnet" })),
        )
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    let health = commands::get_health(&state).await.data.unwrap();

    assert!(health.database);
    assert!(health.config);
    assert!(health.sidecar);
    assert_eq!(health.authenticated, Some(true));
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn test_health_degraded_without_sidecar() {
    let server = MockServer::start().await;
    let (state, _dir) = create_state(&server).await;

    let health = commands::get_health(&state).await.data.unwrap();
    assert!(health.database);
    assert!(!health.sidecar);
    assert!(health.authenticated.is_none());
    assert_eq!(health.status, "degraded");
}

#[tokio::test]
async fn test_invalid_settings_update_is_rejected() {
    let server = MockServer::start().await;
    let (state, _dir) = create_state(&server).await;

    let response = commands::update_settings(
        &state,
        SettingsUpdate {
            sidecar_base_url: Some("localhost:1".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(!response.success);

    let config = commands::get_settings(&state).await.data.unwrap();
    assert_eq!(config.sidecar.base_url, server.uri());

    let updated = commands::update_settings(
        &state,
        SettingsUpdate {
            default_model: Some("haiku".to_string()),
            ..Default::default()
        },
    )
    .await
    .data
    .unwrap();
    assert_eq!(updated.default_model.as_deref(), Some("haiku"));
}

// ============================================================================
// Prompts and graders
// ============================================================================

#[tokio::test]
async fn test_prompt_crud_and_render() {
    let server = MockServer::start().await;
    let (state, _dir) = create_state(&server).await;

    let saved = commands::save_prompt(&state, summary_prompt()).await.data.unwrap();
    assert!(saved.created_at.is_some());
    assert_eq!(saved.variables.len(), 2);

    let mut duplicate = summary_prompt();
    duplicate.id = "prompt-other".to_string();
    assert!(!commands::save_prompt(&state, duplicate).await.success);

    let values = HashMap::from([("topic".to_string(), VariableValue::from("ownership"))]);
    let rendered = commands::render_prompt(&state, "prompt-summary", &values)
        .await
        .data
        .unwrap();
    assert_eq!(rendered, "Summarize ownership for beginners.");

    assert_eq!(commands::list_prompts(&state).await.data.unwrap().len(), 1);
    assert!(commands::delete_prompt(&state, "prompt-summary").await.data.unwrap());
    assert!(!commands::get_prompt(&state, "prompt-summary").await.success);
}

#[tokio::test]
async fn test_builtin_graders_are_seeded_and_protected() {
    let server = MockServer::start().await;
    let (state, _dir) = create_state(&server).await;

    let graders = commands::list_graders(&state).await.data.unwrap();
    assert!(graders.iter().any(|g| g.id == NOT_EMPTY_ID && g.is_builtin));
    assert!(!commands::delete_grader(&state, NOT_EMPTY_ID).await.success);

    commands::save_grader(&state, judge_grader()).await.data.unwrap();
    assert!(commands::delete_grader(&state, "judge-clarity").await.data.unwrap());
}

// ============================================================================
// Runs
// ============================================================================

#[tokio::test]
async fn test_execute_run_persists_results_per_provider() {
    let server = MockServer::start().await;
    mount_stream(&server, Some("opus"), "Opus summary").await;
    mount_stream(&server, None, "Default summary").await;
    Mock::given(method("POST"))
        .and(path("/graders/run-llm-judge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "score": 0.9,
            "passed": true,
            "reason": "clear",
            "executionTimeMs": 30
        })))
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    commands::save_grader(&state, judge_grader()).await.data.unwrap();
    commands::save_prompt(&state, summary_prompt()).await.data.unwrap();

    let values = HashMap::from([("topic".to_string(), VariableValue::from("lifetimes"))]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let executed = commands::execute_run(
        &state,
        "prompt-summary",
        values,
        &CancellationToken::new(),
        Some(&tx),
    )
    .await
    .data
    .unwrap();
    drop(tx);

    assert_eq!(executed.rendered_prompt, "Summarize lifetimes for beginners.");
    assert_eq!(executed.results.len(), 2);
    assert_eq!(executed.results["claude"].output, "Default summary");
    assert_eq!(executed.results["opus"].output, "Opus summary");
    for result in executed.results.values() {
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.grader_results.len(), 2);
        assert!(result.grader_results.iter().all(|r| r.passed));
        assert_eq!(result.usage.map(|u| u.total()), Some(6));
    }

    let mut finished = Vec::new();
    while let Some(event) = rx.recv().await {
        if let ComparisonEvent::Finished { provider_id, .. } = event {
            finished.push(provider_id);
        }
    }
    finished.sort();
    assert_eq!(finished, vec!["claude", "opus"]);

    let runs = commands::list_runs(&state, "prompt-summary").await.data.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.batch_id == executed.batch_id));
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));

    let run_id = executed.results["opus"].run_id.clone().unwrap();
    let context = commands::get_run_context(&state, &run_id).await.data.unwrap();
    assert_eq!(context.run.output.as_deref(), Some("Opus summary"));
    assert_eq!(context.variables["topic"], VariableValue::from("lifetimes"));
    assert_eq!(context.prompts.len(), 1);

    let stored = commands::get_grader_results(&state, &run_id).await.data.unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_execute_run_requires_required_fields() {
    let server = MockServer::start().await;
    let (state, _dir) = create_state(&server).await;
    commands::save_prompt(&state, summary_prompt()).await.data.unwrap();

    let response = commands::execute_run(
        &state,
        "prompt-summary",
        HashMap::new(),
        &CancellationToken::new(),
        None,
    )
    .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("topic"));
    assert!(commands::list_runs(&state, "prompt-summary")
        .await
        .data
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_failed_provider_is_recorded_and_not_graded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "overloaded" })))
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    commands::save_prompt(&state, summary_prompt()).await.data.unwrap();

    let values = HashMap::from([("topic".to_string(), VariableValue::from("traits"))]);
    let executed = commands::execute_run(
        &state,
        "prompt-summary",
        values,
        &CancellationToken::new(),
        None,
    )
    .await
    .data
    .unwrap();

    for result in executed.results.values() {
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("overloaded"));
        assert!(result.grader_results.is_empty());
    }
    let runs = commands::list_runs(&state, "prompt-summary").await.data.unwrap();
    assert!(runs.iter().all(|r| r.status == RunStatus::Failed && r.error.is_some()));
}

#[tokio::test]
async fn test_run_graders_persists_only_with_run_id() {
    let server = MockServer::start().await;
    let (state, _dir) = create_state(&server).await;

    let graders = commands::list_graders(&state).await.data.unwrap();
    let results = commands::run_graders(&state, graders.clone(), "q", r#"{"ok":true}"#, None)
        .await
        .data
        .unwrap();
    assert_eq!(results.len(), graders.len());
    assert!(results.iter().all(|r| r.passed));

    let missing = commands::get_grader_results(&state, "no-such-run").await.data.unwrap();
    assert!(missing.is_empty());
}
