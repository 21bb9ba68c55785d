//! Sidecar HTTP Client
//!
//! Talks to the local Claude Code sidecar:
//! - `GET /health`, `GET /auth-status`
//! - `POST /generate` (single response)
//! - `POST /stream` (SSE, exposed as an `EventStream`)

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::sse::{SidecarStreamAdapter, SseLineBuffer};
use crate::http_client::build_http_client;
use crate::provider::{parse_http_error, EventStream};
use crate::types::{GenerateRequest, LlmError, LlmResponse, LlmResult, StreamRequest};
use incito_core::streaming::{StreamAdapter, UnifiedStreamEvent};

/// Default sidecar address
pub const DEFAULT_SIDECAR_URL: &str = "http://127.0.0.1:3456";

const PROVIDER: &str = "sidecar";

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

impl HealthInfo {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Body of `GET /auth-status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// HTTP client for the sidecar API.
#[derive(Debug, Clone)]
pub struct SidecarClient {
    base_url: String,
    client: reqwest::Client,
    health_timeout: Duration,
}

impl SidecarClient {
    pub fn new(base_url: impl Into<String>) -> LlmResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_http_client(None)?,
            health_timeout: Duration::from_secs(2),
        })
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Soft health check: any failure reads as "not healthy".
    pub async fn health(&self) -> bool {
        match self.health_info().await {
            Ok(info) => info.is_ok(),
            Err(e) => {
                debug!("[Sidecar] health check failed: {}", e);
                false
            }
        }
    }

    pub async fn health_info(&self) -> LlmResult<HealthInfo> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body, PROVIDER));
        }
        Ok(response.json::<HealthInfo>().await?)
    }

    pub async fn auth_status(&self) -> LlmResult<AuthStatus> {
        let response = self
            .client
            .get(self.url("/auth-status"))
            .timeout(self.health_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status, &body, PROVIDER));
        }
        Ok(response.json::<AuthStatus>().await?)
    }

    /// Like `auth_status`, but an unauthenticated answer becomes an error.
    pub async fn ensure_authenticated(&self) -> LlmResult<AuthStatus> {
        let status = self.auth_status().await?;
        if status.authenticated {
            return Ok(status);
        }
        Err(LlmError::Configuration {
            message: status
                .error
                .clone()
                .unwrap_or_else(|| "Claude Code is not authenticated".to_string()),
            hint: status
                .hint
                .clone()
                .or_else(|| Some("Run `claude login` in a terminal".to_string())),
        })
    }

    pub async fn generate(&self, request: &GenerateRequest) -> LlmResult<LlmResponse> {
        if request.prompt.trim().is_empty() {
            return Err(LlmError::InvalidRequest {
                message: "prompt is required".to_string(),
            });
        }

        let response = self
            .client
            .post(self.url("/generate"))
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await?;
            return Err(parse_http_error(status, &body, PROVIDER));
        }
        Ok(response.json::<LlmResponse>().await?)
    }

    /// Open `/stream` and return its events as a stream.
    ///
    /// A reader task owns the HTTP body; it stops as soon as the returned
    /// stream is dropped.
    pub async fn stream(&self, request: &StreamRequest) -> LlmResult<EventStream> {
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest {
                message: "messages array is required".to_string(),
            });
        }

        let response = self
            .client
            .post(self.url("/stream"))
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await?;
            return Err(parse_http_error(status, &body, PROVIDER));
        }

        let (tx, rx) = mpsc::channel::<LlmResult<UnifiedStreamEvent>>(64);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = SseLineBuffer::new();
            let mut adapter = SidecarStreamAdapter::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::network(e.to_string()))).await;
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    if !forward_line(&mut adapter, &line, &tx).await {
                        return;
                    }
                }
            }

            // Leftover without a trailing newline: the connection closed mid-frame.
            if let Some(rest) = lines.finish() {
                if adapter.is_finished() {
                    return;
                }
                match adapter.adapt(&rest) {
                    Ok(events) => {
                        for event in events {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("[Sidecar] dropping truncated frame at end of stream: {}", e),
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Adapt one line and forward its events. Returns false when reading should stop.
async fn forward_line(
    adapter: &mut SidecarStreamAdapter,
    line: &str,
    tx: &mpsc::Sender<LlmResult<UnifiedStreamEvent>>,
) -> bool {
    match adapter.adapt(line) {
        Ok(events) => {
            for event in events {
                let terminal = event.is_terminal();
                if tx.send(Ok(event)).await.is_err() {
                    debug!("[Sidecar] stream receiver dropped");
                    return false;
                }
                if terminal {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            let _ = tx.send(Err(LlmError::parse(e.to_string()))).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn collect(mut stream: EventStream) -> Vec<LlmResult<UnifiedStreamEvent>> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_health_ok_and_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "provider": "claude-code",
                "timestamp": "2026-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let client = SidecarClient::new(server.uri()).unwrap();
        assert!(client.health().await);

        let down = SidecarClient::new("http://127.0.0.1:9")
            .unwrap()
            .with_health_timeout(Duration::from_millis(200));
        assert!(!down.health().await);
    }

    #[tokio::test]
    async fn test_ensure_authenticated_maps_to_configuration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "authenticated": false,
                "error": "not logged in",
                "hint": "run claude login"
            })))
            .mount(&server)
            .await;

        let client = SidecarClient::new(server.uri()).unwrap();
        let err = client.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, LlmError::Configuration { .. }));
        assert_eq!(err.hint(), Some("run claude login"));
    }

    #[tokio::test]
    async fn test_generate_success_and_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello",
                "finishReason": "stop"
            })))
            .mount(&server)
            .await;

        let client = SidecarClient::new(server.uri()).unwrap();
        let resp = client
            .generate(&GenerateRequest {
                prompt: "hi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resp.text, "hello");

        let err = client
            .generate(&GenerateRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_stream_parses_frames_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\":\"text\",\"content\":\"Hel\"}\n\n",
            "data: {\"type\":\"text\",\"content\":\"lo\"}\n\n",
            "data: {\"type\":\"done\"}\n\n",
            "data: {\"type\":\"text\",\"content\":\"ignored\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = SidecarClient::new(server.uri()).unwrap();
        let stream = client
            .stream(&StreamRequest {
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap();

        let events: Vec<UnifiedStreamEvent> =
            collect(stream).await.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            UnifiedStreamEvent::TextDelta {
                content: "Hel".to_string()
            }
        );
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn test_stream_malformed_frame_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("data: {\"type\":\"text\",\n"),
            )
            .mount(&server)
            .await;

        let client = SidecarClient::new(server.uri()).unwrap();
        let stream = client
            .stream(&StreamRequest {
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(LlmError::ParseError { .. })));
    }

    #[tokio::test]
    async fn test_stream_rejects_empty_messages() {
        let client = SidecarClient::new(DEFAULT_SIDECAR_URL).unwrap();
        let err = client.stream(&StreamRequest::default()).await.err().unwrap();
        assert!(matches!(err, LlmError::InvalidRequest { .. }));
    }
}
