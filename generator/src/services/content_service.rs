//! Article content backend (OpenRouter chat completions)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use shared::{ApiConfig, ApiFailure, GenerationRequest, ServiceKind};
use crate::services::http::{build_client, embedded_error, read_json, transport_failure};
use crate::traits::GenerationBackend;
use crate::types::BackendResponse;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert SEO content writer.";

/// Content backend speaking the OpenAI-compatible chat completions API
pub struct ContentService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ContentService {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: build_client(config.http_timeout),
            api_key: config.openrouter_api_key.clone(),
            base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Override the endpoint, used against local mock servers
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    fn request_body(&self, request: &GenerationRequest) -> (String, serde_json::Value) {
        let params = &request.params;
        let model = params
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&self.default_model)
            .to_string();
        let system = request
            .system
            .as_deref()
            .or_else(|| params.get("system").and_then(|s| s.as_str()))
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let temperature = params
            .get("temperature")
            .and_then(|t| t.as_f64())
            .unwrap_or(self.temperature as f64);
        let max_tokens = params
            .get("max_tokens")
            .and_then(|t| t.as_u64())
            .unwrap_or(self.max_tokens as u64);

        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.payload }
            ],
            "temperature": temperature,
            "max_tokens": max_tokens
        });
        (model, body)
    }
}

#[async_trait]
impl GenerationBackend for ContentService {
    fn service(&self) -> ServiceKind {
        ServiceKind::Content
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<BackendResponse, ApiFailure> {
        if self.api_key.is_empty() {
            return Err(ApiFailure::AuthenticationFailed);
        }

        let (model, body) = self.request_body(request);
        let request_start = Instant::now();

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "SEO Blog Engine")
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let response_json = read_json(response).await?;
        let response_time = request_start.elapsed();

        if let Some(failure) = embedded_error(&response_json) {
            return Err(failure);
        }

        let content = response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ApiFailure::InvalidResponse("No content in response".to_string()))?;

        let total_tokens = response_json
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(0);

        let model_used = response_json
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(model);

        Ok(BackendResponse {
            output: content.to_string(),
            units: total_tokens,
            model_used,
            response_time,
        })
    }
}
