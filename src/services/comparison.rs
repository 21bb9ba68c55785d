//! Comparison Runs
//!
//! Streams one rendered prompt through several providers at once. Every
//! provider is isolated: a failure or cancellation only affects its own
//! entry in the result map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use incito_core::UnifiedStreamEvent;
use incito_llm::{LlmError, LlmProvider, Message, StreamRequest, UsageStats};

use crate::models::run::{ComparisonEvent, ProviderRunResult, RunStatus};

pub struct ComparisonRunner {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ComparisonRunner {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn LlmProvider>] {
        &self.providers
    }

    /// Run `prompt` on every provider concurrently, keyed by provider id.
    pub async fn run(
        &self,
        system: Option<&str>,
        prompt: &str,
        token: &CancellationToken,
        events: Option<&mpsc::UnboundedSender<ComparisonEvent>>,
    ) -> HashMap<String, ProviderRunResult> {
        let request = StreamRequest {
            model: None,
            system: system.map(str::to_string),
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
        };

        debug!(
            "[Comparison] running {} provider(s)",
            self.providers.len()
        );

        let results = join_all(
            self.providers
                .iter()
                .map(|provider| run_provider(provider.as_ref(), request.clone(), token, events)),
        )
        .await;

        results
            .into_iter()
            .map(|result| (result.provider_id.clone(), result))
            .collect()
    }
}

async fn run_provider(
    provider: &dyn LlmProvider,
    request: StreamRequest,
    token: &CancellationToken,
    events: Option<&mpsc::UnboundedSender<ComparisonEvent>>,
) -> ProviderRunResult {
    let started = Instant::now();
    let mut result = ProviderRunResult::new(provider.id());
    result.model = provider.model().map(str::to_string);

    match stream_into(provider, request, token, events, &mut result).await {
        Ok(()) => result.status = RunStatus::Completed,
        Err(e) if e.is_cancelled() => result.status = RunStatus::Cancelled,
        Err(e) => {
            warn!("[Comparison] provider {} failed: {}", provider.id(), e);
            result.status = RunStatus::Failed;
            result.error = Some(e.to_string());
        }
    }
    result.duration_ms = started.elapsed().as_millis() as u64;

    if let Some(tx) = events {
        let _ = tx.send(ComparisonEvent::Finished {
            provider_id: result.provider_id.clone(),
            status: result.status,
        });
    }
    result
}

async fn stream_into(
    provider: &dyn LlmProvider,
    request: StreamRequest,
    token: &CancellationToken,
    events: Option<&mpsc::UnboundedSender<ComparisonEvent>>,
    result: &mut ProviderRunResult,
) -> Result<(), LlmError> {
    let mut stream = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(LlmError::Cancelled),
        stream = provider.stream(request) => stream?,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(LlmError::Cancelled),
            next = stream.next() => next,
        };

        match next {
            None => return Ok(()),
            Some(Err(e)) => return Err(e),
            Some(Ok(UnifiedStreamEvent::TextDelta { content })) => {
                result.output.push_str(&content);
                if let Some(tx) = events {
                    let _ = tx.send(ComparisonEvent::Delta {
                        provider_id: result.provider_id.clone(),
                        content,
                    });
                }
            }
            Some(Ok(UnifiedStreamEvent::Usage {
                input_tokens,
                output_tokens,
            })) => {
                result.usage = Some(UsageStats {
                    input_tokens,
                    output_tokens,
                });
            }
            Some(Ok(UnifiedStreamEvent::Error { message, .. })) => {
                return Err(LlmError::other(message));
            }
            Some(Ok(UnifiedStreamEvent::Complete { .. })) => return Ok(()),
            Some(Ok(_)) => {}
        }
    }
}
