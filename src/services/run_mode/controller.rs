//! Run Mode Controller
//!
//! Drives the guided conversation that collects variable values:
//!
//! 1. `begin_turn` validates and mutates state under one write lock, so at
//!    most one model call is in flight per session.
//! 2. `drive_turn` streams text into a placeholder assistant message and
//!    buffers tool calls, racing every read against the turn's token.
//! 3. After the stream ends all buffered tool calls are parsed first and
//!    only then applied.
//!
//! Turns carry the session id they started in; results from a session that
//! was exited or restarted in the meantime are dropped.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use incito_core::{CoreError, UnifiedStreamEvent};
use incito_llm::{LlmError, LlmProvider, Message, MessageRole, StreamRequest};
use incito_prompt::VariableValue;
use incito_tools::{run_mode_tools, RunModeToolCall};

use super::prompt_builder::{build_system_prompt, KICKOFF_MESSAGE};
use super::types::{
    RunModeError, RunModeEvent, RunModeMessage, RunModePhase, RunModeResult, RunModeSnapshot,
    RunModeState, TurnOutcome,
};
use crate::models::prompt::PromptDocument;

struct ActiveTurn {
    placeholder_id: String,
    token: CancellationToken,
}

struct PreparedTurn {
    session_id: String,
    placeholder_id: String,
    request: StreamRequest,
    token: CancellationToken,
}

pub struct RunModeController {
    provider: Arc<dyn LlmProvider>,
    state: Arc<RwLock<RunModeState>>,
    active_turn: Mutex<Option<ActiveTurn>>,
    events: Option<mpsc::UnboundedSender<RunModeEvent>>,
}

impl RunModeController {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            state: Arc::new(RwLock::new(RunModeState::default())),
            active_turn: Mutex::new(None),
            events: None,
        }
    }

    /// Forward state changes to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<RunModeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub async fn snapshot(&self) -> RunModeSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn phase(&self) -> RunModePhase {
        self.state.read().await.phase
    }

    /// Values collected so far.
    pub async fn final_values(&self) -> std::collections::HashMap<String, VariableValue> {
        self.state.read().await.values.clone()
    }

    /// The prompt and collected values once the model has called `finishRun`.
    pub async fn finished_session(
        &self,
    ) -> RunModeResult<(PromptDocument, std::collections::HashMap<String, VariableValue>)> {
        let state = self.state.read().await;
        match (&state.prompt, state.phase) {
            (Some(prompt), RunModePhase::Finished) => Ok((prompt.clone(), state.values.clone())),
            _ => Err(RunModeError::NotFinished),
        }
    }

    /// The prompt rendered with the collected values, if a session is active.
    pub async fn rendered_prompt(&self) -> Option<String> {
        let state = self.state.read().await;
        state.prompt.as_ref().map(|p| p.render(&state.values))
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Reset all state for `prompt` and run the opening model turn.
    pub async fn start_run_mode(
        &self,
        prompt: PromptDocument,
        custom_instructions: Option<String>,
    ) -> RunModeResult<TurnOutcome> {
        self.stop_generation().await;
        {
            let mut state = self.state.write().await;
            *state = RunModeState::started(prompt, custom_instructions);
            info!(
                "[RunMode] started for prompt {:?} (session {})",
                state.prompt.as_ref().map(|p| p.name.as_str()),
                state.session_id
            );
        }
        self.run_turn(|_| Ok(None)).await
    }

    /// Send free text from the user and run a model turn.
    pub async fn send_user_message(&self, text: &str) -> RunModeResult<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RunModeError::EmptyMessage);
        }
        let text = text.to_string();
        self.run_turn(move |_| Ok(Some(text))).await
    }

    /// Complete a field from the UI, then tell the model about it.
    ///
    /// The completion and the confirmation message are applied together with
    /// the turn setup; if a turn is already in flight neither happens.
    pub async fn submit_field_value(
        &self,
        key: &str,
        value: VariableValue,
    ) -> RunModeResult<TurnOutcome> {
        self.run_turn(|state| {
            let variable = state
                .variable(key)
                .cloned()
                .ok_or_else(|| RunModeError::UnknownField(key.to_string()))?;

            let value = variable.coerce(value);
            let rendered = value.render(variable.list_format());
            state.complete_field(key, value.clone());
            self.emit(RunModeEvent::FieldCompleted {
                key: key.to_string(),
                value,
            });
            debug!("[RunMode] field {} submitted by user", key);
            Ok(Some(format!("{}: {}", variable.label, rendered)))
        })
        .await
    }

    /// Cancel the in-flight model call, if any.
    pub async fn stop_generation(&self) -> bool {
        match self.active_turn.lock().await.take() {
            Some(turn) => {
                turn.token.cancel();
                debug!("[RunMode] cancelled turn {}", turn.placeholder_id);
                true
            }
            None => false,
        }
    }

    /// Cancel any model call and return to idle.
    pub async fn exit_run_mode(&self) {
        self.stop_generation().await;
        *self.state.write().await = RunModeState::default();
        info!("[RunMode] exited");
    }

    // ========================================================================
    // Turn pipeline
    // ========================================================================

    async fn run_turn<F>(&self, prepare: F) -> RunModeResult<TurnOutcome>
    where
        F: FnOnce(&mut RunModeState) -> RunModeResult<Option<String>>,
    {
        let turn = self.begin_turn(prepare).await?;
        let result = self.drive_turn(&turn).await;
        self.clear_active_turn(&turn.placeholder_id).await;

        match result {
            Ok(tool_calls) => self.complete_turn(&turn, tool_calls).await,
            Err(e) if e.is_cancelled() => Ok(self.finish_cancelled(&turn).await),
            Err(e) => {
                self.fail_turn(&turn, &e).await;
                Err(e)
            }
        }
    }

    /// `prepare` runs under the same write lock as the turn checks and setup.
    /// It may mutate state and returns the user message to append, if any.
    async fn begin_turn<F>(&self, prepare: F) -> RunModeResult<PreparedTurn>
    where
        F: FnOnce(&mut RunModeState) -> RunModeResult<Option<String>>,
    {
        let mut state = self.state.write().await;
        if !state.phase.is_active() {
            return Err(RunModeError::NotActive);
        }
        if state.is_loading {
            return Err(RunModeError::TurnInFlight);
        }

        if let Some(text) = prepare(&mut *state)? {
            let message = RunModeMessage::new(MessageRole::User, text);
            state.messages.push(message.clone());
            self.emit(RunModeEvent::MessageAppended { message });
        }

        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| Message {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        if messages.is_empty() {
            messages.push(Message::user(KICKOFF_MESSAGE));
        }

        let request = StreamRequest {
            model: None,
            system: Some(build_system_prompt(&state)),
            messages,
            tools: if self.provider.supports_tools() {
                run_mode_tools()
            } else {
                Vec::new()
            },
        };

        let placeholder = RunModeMessage::new(MessageRole::Assistant, "");
        let placeholder_id = placeholder.id.clone();
        state.messages.push(placeholder.clone());
        self.emit(RunModeEvent::MessageAppended {
            message: placeholder,
        });
        state.is_loading = true;
        state.error = None;

        let token = CancellationToken::new();
        *self.active_turn.lock().await = Some(ActiveTurn {
            placeholder_id: placeholder_id.clone(),
            token: token.clone(),
        });

        debug!(
            "[RunMode] turn {} with {} message(s)",
            placeholder_id,
            request.messages.len()
        );

        Ok(PreparedTurn {
            session_id: state.session_id.clone(),
            placeholder_id,
            request,
            token,
        })
    }

    /// Stream one response. Returns the buffered `(tool name, arguments)` pairs.
    async fn drive_turn(&self, turn: &PreparedTurn) -> RunModeResult<Vec<(String, String)>> {
        let mut stream = tokio::select! {
            biased;
            _ = turn.token.cancelled() => return Err(RunModeError::Cancelled),
            stream = self.provider.stream(turn.request.clone()) => stream?,
        };

        let mut tool_calls = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = turn.token.cancelled() => return Err(RunModeError::Cancelled),
                next = stream.next() => next,
            };

            let event = match next {
                Some(event) => event?,
                None => break,
            };

            match event {
                UnifiedStreamEvent::TextDelta { content } => {
                    self.append_to_placeholder(turn, &content).await;
                }
                UnifiedStreamEvent::ToolComplete {
                    tool_name,
                    arguments,
                    ..
                } => {
                    tool_calls.push((tool_name, arguments));
                }
                UnifiedStreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    debug!(
                        "[RunMode] usage: {} in / {} out",
                        input_tokens, output_tokens
                    );
                }
                UnifiedStreamEvent::Error { message, .. } => {
                    return Err(LlmError::other(message).into());
                }
                UnifiedStreamEvent::Complete { .. } => break,
            }
        }

        Ok(tool_calls)
    }

    async fn append_to_placeholder(&self, turn: &PreparedTurn, delta: &str) {
        let mut state = self.state.write().await;
        if state.session_id != turn.session_id {
            return;
        }
        if let Some(message) = state.message_mut(&turn.placeholder_id) {
            message.content.push_str(delta);
            let content = message.content.clone();
            self.emit(RunModeEvent::MessageUpdated {
                id: turn.placeholder_id.clone(),
                content,
            });
        }
    }

    async fn complete_turn(
        &self,
        turn: &PreparedTurn,
        raw_calls: Vec<(String, String)>,
    ) -> RunModeResult<TurnOutcome> {
        let mut calls = Vec::with_capacity(raw_calls.len());
        for (name, arguments) in raw_calls {
            match RunModeToolCall::parse(&name, &arguments) {
                Ok(call) => calls.push(call),
                Err(CoreError::NotFound(message)) => {
                    warn!("[RunMode] ignoring tool call: {}", message);
                }
                Err(e) => {
                    let err = RunModeError::ToolCall(e.to_string());
                    self.fail_turn(turn, &err).await;
                    return Err(err);
                }
            }
        }

        let mut state = self.state.write().await;
        if state.session_id != turn.session_id {
            return Ok(TurnOutcome::default());
        }

        for call in &calls {
            self.apply_tool_call(&mut state, call);
        }

        let text = self.settle_placeholder(&mut state, &turn.placeholder_id);
        state.is_loading = false;
        Ok(TurnOutcome {
            text,
            tool_calls: calls,
            cancelled: false,
        })
    }

    fn apply_tool_call(&self, state: &mut RunModeState, call: &RunModeToolCall) {
        match call {
            RunModeToolCall::DisplayField {
                variable_key,
                message,
            } => {
                if state.variable(variable_key).is_none() {
                    warn!("[RunMode] displayField for unknown field {}", variable_key);
                    return;
                }
                if let Some(message) = message {
                    debug!("[RunMode] displayField {}: {}", variable_key, message);
                }
                state.displayed_field = Some(variable_key.clone());
                self.emit(RunModeEvent::FieldDisplayed {
                    key: variable_key.clone(),
                });
            }
            RunModeToolCall::CompleteField {
                variable_key,
                value,
            } => {
                let Some(variable) = state.variable(variable_key) else {
                    warn!("[RunMode] completeField for unknown field {}", variable_key);
                    return;
                };
                let value = variable.coerce(value.clone());
                state.complete_field(variable_key, value.clone());
                self.emit(RunModeEvent::FieldCompleted {
                    key: variable_key.clone(),
                    value,
                });
            }
            RunModeToolCall::AskFollowUp {
                related_field,
                question,
            } => {
                info!("[RunMode] follow-up on {}: {}", related_field, question);
            }
            RunModeToolCall::FinishRun { summary } => {
                state.phase = RunModePhase::Finished;
                state.displayed_field = None;
                self.emit(RunModeEvent::Finished);
                info!(
                    "[RunMode] finished{}",
                    summary
                        .as_deref()
                        .map(|s| format!(": {}", s))
                        .unwrap_or_default()
                );
            }
        }
    }

    /// Drop the placeholder if it stayed empty; returns its final text.
    fn settle_placeholder(&self, state: &mut RunModeState, placeholder_id: &str) -> String {
        let text = state
            .messages
            .iter()
            .find(|m| m.id == placeholder_id)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if text.trim().is_empty() && state.remove_message(placeholder_id) {
            self.emit(RunModeEvent::MessageRemoved {
                id: placeholder_id.to_string(),
            });
        }
        text
    }

    async fn finish_cancelled(&self, turn: &PreparedTurn) -> TurnOutcome {
        let mut state = self.state.write().await;
        if state.session_id != turn.session_id {
            return TurnOutcome {
                cancelled: true,
                ..Default::default()
            };
        }
        let text = self.settle_placeholder(&mut state, &turn.placeholder_id);
        state.is_loading = false;
        info!("[RunMode] generation stopped");
        TurnOutcome {
            text,
            tool_calls: Vec::new(),
            cancelled: true,
        }
    }

    /// Remove only the in-flight placeholder; the rest of the conversation stays.
    async fn fail_turn(&self, turn: &PreparedTurn, err: &RunModeError) {
        warn!("[RunMode] turn failed: {}", err);
        let mut state = self.state.write().await;
        if state.session_id != turn.session_id {
            return;
        }
        if state.remove_message(&turn.placeholder_id) {
            self.emit(RunModeEvent::MessageRemoved {
                id: turn.placeholder_id.clone(),
            });
        }
        state.is_loading = false;
        state.error = Some(err.to_string());
        self.emit(RunModeEvent::Error {
            message: err.to_string(),
        });
    }

    async fn clear_active_turn(&self, placeholder_id: &str) {
        let mut active = self.active_turn.lock().await;
        if active
            .as_ref()
            .is_some_and(|turn| turn.placeholder_id == placeholder_id)
        {
            *active = None;
        }
    }

    fn emit(&self, event: RunModeEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
