//! Run Mode Integration Tests
//!
//! Run mode built from `AppState` and talking to a wiremock sidecar over SSE:
//! - the opening turn carries the system prompt and tool definitions
//! - tool calls display and complete fields, then finish the session
//! - a finished session is executed, graded and stored
//! - stopping an in-flight turn

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use incito_desktop::commands;
use incito_desktop::models::prompt::PromptDocument;
use incito_desktop::models::run::RunStatus;
use incito_desktop::services::run_mode::{RunModeEvent, RunModePhase, KICKOFF_MESSAGE};
use incito_desktop::storage::database::Database;
use incito_desktop::AppState;
use incito_graders::builtin::NOT_EMPTY_ID;
use incito_llm::MessageRole;
use incito_prompt::{VariableType, VariableValue};

async fn create_state(server: &MockServer) -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let config_path: PathBuf = dir.path().join("config.json");
    std::fs::write(
        &config_path,
        json!({ "sidecar": { "base_url": server.uri() }, "default_model": "sonnet" }).to_string(),
    )
    .unwrap();

    let state = AppState::new();
    state
        .initialize_at(config_path, Database::new_in_memory().unwrap())
        .await
        .unwrap();
    (state, dir)
}

fn sse_response(frames: &[serde_json::Value]) -> ResponseTemplate {
    let body: String = frames
        .iter()
        .map(|frame| format!("data: {}\n\n", frame))
        .collect();
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn essay_prompt() -> PromptDocument {
    let mut prompt = PromptDocument::new(
        "prompt-essay",
        "Essay",
        "Write about {{topic}} covering {{points}}.",
    );
    prompt.variables[0].required = true;
    prompt.variables[1].var_type = VariableType::Array;
    prompt.variables[1].required = true;
    prompt
}

#[tokio::test]
async fn test_guided_session_fills_fields_and_finishes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(sse_response(&[
            json!({ "type": "text", "content": "What should the essay be about?" }),
            json!({
                "type": "tool_call",
                "id": "t1",
                "name": "displayField",
                "input": { "variableKey": "topic" }
            }),
            json!({ "type": "done" }),
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(sse_response(&[
            json!({
                "type": "tool_call",
                "id": "t2",
                "name": "completeField",
                "input": { "variableKey": "topic", "value": "borrowing" }
            }),
            json!({
                "type": "tool_call",
                "id": "t3",
                "name": "completeField",
                "input": { "variableKey": "points", "value": ["moves", "references"] }
            }),
            json!({ "type": "tool_call", "id": "t4", "name": "finishRun", "input": {} }),
            json!({ "type": "done" }),
        ]))
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = state.run_mode_controller(Some(tx)).await.unwrap();

    let opening = controller.start_run_mode(essay_prompt(), None).await.unwrap();
    assert_eq!(opening.text, "What should the essay be about?");
    assert_eq!(opening.tool_calls.len(), 1);

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, RunModePhase::Collecting);
    assert_eq!(snapshot.displayed_field.as_deref(), Some("topic"));
    assert_eq!(snapshot.progress.completed, 0);
    assert_eq!(snapshot.progress.total, 2);

    let requests = server.received_requests().await.unwrap();
    let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(first["model"], "sonnet");
    assert_eq!(first["messages"][0]["content"], KICKOFF_MESSAGE);
    assert_eq!(first["tools"].as_array().unwrap().len(), 4);
    assert!(first["system"].as_str().unwrap().contains("topic"));

    let reply = controller.send_user_message("Borrowing, please").await.unwrap();
    assert_eq!(reply.tool_calls.len(), 3);
    assert!(reply.text.is_empty());

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, RunModePhase::Finished);
    assert!(snapshot.displayed_field.is_none());
    assert_eq!(snapshot.progress.completed, 2);
    assert_eq!(snapshot.completed_fields, vec!["topic", "points"]);
    let last = snapshot.messages.last().unwrap();
    assert_eq!(last.role, MessageRole::User);

    let values = controller.final_values().await;
    assert_eq!(
        values["points"],
        VariableValue::from(vec!["moves", "references"])
    );
    assert_eq!(
        controller.rendered_prompt().await.as_deref(),
        Some("Write about borrowing covering moves, references.")
    );

    let second: serde_json::Value =
        serde_json::from_slice(&server.received_requests().await.unwrap()[1].body).unwrap();
    let roles: Vec<&str> = second["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["assistant", "user"]);

    let mut displayed = 0;
    let mut completed = 0;
    let mut finished = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            RunModeEvent::FieldDisplayed { .. } => displayed += 1,
            RunModeEvent::FieldCompleted { .. } => completed += 1,
            RunModeEvent::Finished => finished = true,
            _ => {}
        }
    }
    assert_eq!(displayed, 1);
    assert_eq!(completed, 2);
    assert!(finished);
}

#[tokio::test]
async fn test_finished_session_is_executed_and_graded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(sse_response(&[
            json!({ "type": "text", "content": "What should the essay be about?" }),
            json!({ "type": "done" }),
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(sse_response(&[
            json!({
                "type": "tool_call",
                "id": "t1",
                "name": "completeField",
                "input": { "variableKey": "topic", "value": "borrowing" }
            }),
            json!({
                "type": "tool_call",
                "id": "t2",
                "name": "completeField",
                "input": { "variableKey": "points", "value": "moves, references" }
            }),
            json!({ "type": "tool_call", "id": "t3", "name": "finishRun", "input": {} }),
            json!({ "type": "done" }),
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(sse_response(&[
            json!({ "type": "text", "content": "Borrowing lets code use a value without owning it." }),
            json!({ "type": "done" }),
        ]))
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    let mut prompt = essay_prompt();
    prompt.grader_ids = vec![NOT_EMPTY_ID.to_string()];
    let prompt = commands::save_prompt(&state, prompt).await.data.unwrap();

    let controller = state.run_mode_controller(None).await.unwrap();
    controller.start_run_mode(prompt, None).await.unwrap();

    let early =
        commands::execute_run_mode(&state, &controller, &CancellationToken::new(), None).await;
    assert!(!early.success);
    assert!(early.error.unwrap().contains("not finished"));

    controller
        .send_user_message("Borrowing; cover moves and references")
        .await
        .unwrap();
    assert_eq!(controller.phase().await, RunModePhase::Finished);

    let executed = commands::execute_run_mode(&state, &controller, &CancellationToken::new(), None)
        .await
        .data
        .unwrap();
    assert_eq!(
        executed.rendered_prompt,
        "Write about borrowing covering moves, references."
    );
    assert_eq!(executed.results.len(), 1);

    let result = executed.results.values().next().unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(
        result.output,
        "Borrowing lets code use a value without owning it."
    );

    let run_id = result.run_id.clone().unwrap();
    let stored = commands::get_grader_results(&state, &run_id).await.data.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].grader_id, NOT_EMPTY_ID);
    assert!(stored[0].passed);

    let context = commands::get_run_context(&state, &run_id).await.data.unwrap();
    assert_eq!(
        context.variables["points"],
        VariableValue::from(vec!["moves", "references"])
    );
}

#[tokio::test]
async fn test_stop_generation_cancels_slow_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(
            sse_response(&[json!({ "type": "done" })]).set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    let controller = Arc::new(state.run_mode_controller(None).await.unwrap());

    let turn = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_run_mode(essay_prompt(), None).await })
    };

    let mut stopped = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if controller.stop_generation().await {
            stopped = true;
            break;
        }
    }
    assert!(stopped);

    let outcome = tokio::time::timeout(Duration::from_secs(5), turn)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(outcome.cancelled);

    let snapshot = controller.snapshot().await;
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.phase, RunModePhase::Collecting);
    assert!(snapshot.messages.iter().all(|m| !m.content.is_empty()));
}

#[tokio::test]
async fn test_sidecar_error_is_kept_on_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "not logged in" })))
        .mount(&server)
        .await;

    let (state, _dir) = create_state(&server).await;
    let controller = state.run_mode_controller(None).await.unwrap();

    let err = controller
        .start_run_mode(essay_prompt(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not logged in"));

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, RunModePhase::Collecting);
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_some());

    controller.exit_run_mode().await;
    assert_eq!(controller.phase().await, RunModePhase::Idle);
    assert!(controller.send_user_message("hello").await.is_err());
}
