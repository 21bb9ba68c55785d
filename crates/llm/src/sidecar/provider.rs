//! Sidecar-backed `LlmProvider`.

use std::sync::Arc;

use async_trait::async_trait;

use super::client::SidecarClient;
use crate::provider::{EventStream, LlmProvider};
use crate::types::{GenerateRequest, LlmResponse, LlmResult, StreamRequest};

/// Provider that routes requests through the sidecar, optionally pinning a model.
#[derive(Debug, Clone)]
pub struct SidecarProvider {
    id: String,
    model: Option<String>,
    client: Arc<SidecarClient>,
}

impl SidecarProvider {
    pub fn new(id: impl Into<String>, client: Arc<SidecarClient>) -> Self {
        Self {
            id: id.into(),
            model: None,
            client,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl LlmProvider for SidecarProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn generate(&self, mut request: GenerateRequest) -> LlmResult<LlmResponse> {
        if request.model.is_none() {
            request.model = self.model.clone();
        }
        self.client.generate(&request).await
    }

    async fn stream(&self, mut request: StreamRequest) -> LlmResult<EventStream> {
        if request.model.is_none() {
            request.model = self.model.clone();
        }
        self.client.stream(&request).await
    }

    async fn health_check(&self) -> bool {
        self.client.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_pinned_model_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(body_partial_json(serde_json::json!({ "model": "sonnet" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "ok" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = Arc::new(SidecarClient::new(server.uri()).unwrap());
        let provider = SidecarProvider::new("claude-sonnet", client).with_model("sonnet");
        assert_eq!(provider.id(), "claude-sonnet");

        let resp = provider
            .generate(GenerateRequest {
                prompt: "hi".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resp.text, "ok");
    }
}
