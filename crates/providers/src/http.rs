//! OpenAI-compatible completion service.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing a
//! `/v1/chat/completions`-shaped API. The triage core only needs plain
//! prompt-in, text-out completion; tool calling and streaming are out of
//! scope at this boundary.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use carepod_config::CompletionConfig;
use carepod_core::completion::{CompletionRequest, CompletionResponse, CompletionService};
use carepod_core::error::CompletionError;

/// An OpenAI-compatible completion backend.
pub struct HttpCompletionService {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpCompletionService {
    /// Build from configuration. The reqwest client carries a generous
    /// outer timeout; per-call budgets are enforced by the orchestrator.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(intent = %request.intent, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout { budget_ms: 30_000 }
                } else {
                    CompletionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Completion service error");
            return Err(CompletionError::Service {
                status_code: status.as_u16(),
                message,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                CompletionError::InvalidResponse("response carried no message content".into())
            })?;

        Ok(CompletionResponse {
            text,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}
