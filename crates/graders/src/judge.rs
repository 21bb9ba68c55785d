//! LLM Judge Delegation
//!
//! LLM-judge graders are scored by a local endpoint,
//! `POST /graders/run-llm-judge` with `{grader, input, output}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Grader, GraderError, GraderResult, GradingResult};
use incito_llm::build_http_client;

/// Scores one output with one LLM-judge grader.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn run_llm_judge(
        &self,
        grader: &Grader,
        input: &str,
        output: &str,
    ) -> GradingResult<GraderResult>;
}

#[derive(Serialize)]
struct JudgeRequest<'a> {
    grader: &'a Grader,
    input: &'a str,
    output: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgeResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    raw_score: Option<f64>,
    #[serde(default)]
    execution_time_ms: Option<u64>,
}

/// Judge client for the HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpJudgeClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpJudgeClient {
    pub fn new(base_url: impl Into<String>) -> GradingResult<Self> {
        let client = build_http_client(None).map_err(|e| GraderError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/graders/run-llm-judge", self.base_url)
    }
}

#[async_trait]
impl JudgeClient for HttpJudgeClient {
    async fn run_llm_judge(
        &self,
        grader: &Grader,
        input: &str,
        output: &str,
    ) -> GradingResult<GraderResult> {
        debug!("[Graders] judging with {}", grader.id);

        let response = self
            .client
            .post(self.endpoint())
            .json(&JudgeRequest {
                grader,
                input,
                output,
            })
            .send()
            .await
            .map_err(|e| GraderError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GraderError::Network(e.to_string()))?;

        let parsed: Option<JudgeResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body));
            return Err(GraderError::Judge(message));
        }

        let parsed = parsed
            .ok_or_else(|| GraderError::Judge(format!("Unreadable judge response: {}", body)))?;
        if let Some(error) = parsed.error {
            return Err(GraderError::Judge(error));
        }

        let score = parsed
            .score
            .ok_or_else(|| GraderError::Judge("Judge response has no score".to_string()))?;
        Ok(GraderResult {
            grader_id: grader.id.clone(),
            score,
            passed: parsed.passed.unwrap_or(score >= 0.5),
            reason: parsed.reason,
            raw_score: parsed.raw_score,
            execution_time_ms: parsed.execution_time_ms.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LlmJudgeConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn judge() -> Grader {
        Grader::llm_judge(
            "helpful",
            "Helpfulness",
            LlmJudgeConfig {
                provider_id: "claude".to_string(),
                prompt_template: "Rate {{output}}".to_string(),
                system_prompt: None,
                output_schema: serde_json::Value::Null,
            },
        )
    }

    #[tokio::test]
    async fn test_judge_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graders/run-llm-judge"))
            .and(body_partial_json(serde_json::json!({ "input": "q", "output": "a" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "score": 0.8,
                "passed": true,
                "reason": "good",
                "rawScore": 8,
                "executionTimeMs": 120
            })))
            .mount(&server)
            .await;

        let client = HttpJudgeClient::new(server.uri()).unwrap();
        let result = client.run_llm_judge(&judge(), "q", "a").await.unwrap();
        assert_eq!(result.grader_id, "helpful");
        assert_eq!(result.score, 0.8);
        assert_eq!(result.raw_score, Some(8.0));
        assert_eq!(result.execution_time_ms, 120);
    }

    #[tokio::test]
    async fn test_judge_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graders/run-llm-judge"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "error": "provider not configured" })),
            )
            .mount(&server)
            .await;

        let client = HttpJudgeClient::new(server.uri()).unwrap();
        let err = client.run_llm_judge(&judge(), "q", "a").await.unwrap_err();
        assert_eq!(err, GraderError::Judge("provider not configured".to_string()));
    }
}
