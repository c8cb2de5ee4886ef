//! Image backend (Gemini generateContent with image output)
//!
//! Inline image bytes are written under the output directory and the saved
//! path becomes the image reference. A hosted `fileData` URI is passed through.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use tracing::info;

use shared::{ApiConfig, ApiFailure, GenerationRequest, ServiceKind};
use crate::services::http::{build_client, embedded_error, read_json, transport_failure};
use crate::traits::GenerationBackend;
use crate::types::BackendResponse;

pub struct ImageService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    output_dir: PathBuf,
}

impl ImageService {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: build_client(config.http_timeout),
            api_key: config.image_api_key.clone(),
            base_url: config.image_api_base_url.trim_end_matches('/').to_string(),
            model: config.image_model.clone(),
            output_dir: config.image_output_dir.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// `<placeholder>_<8 hex>.<ext>`, or just `<8 hex>.<ext>` without a placeholder
    fn file_name(placeholder: Option<&str>, mime_type: &str) -> String {
        let extension = match mime_type {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        };
        let id = uuid::Uuid::new_v4().simple().to_string();
        let stem: String = placeholder
            .unwrap_or_default()
            .chars()
            .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
            .collect();
        let name = format!("{}_{}.{}", stem.trim(), &id[..8], extension);
        name.trim_start_matches('_').to_string()
    }

    async fn store_inline(&self, placeholder: Option<&str>, mime_type: &str, data: &str) -> Result<String, ApiFailure> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| ApiFailure::InvalidResponse(format!("Invalid base64 image data: {e}")))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ApiFailure::Unknown(format!("Cannot create image directory: {e}")))?;

        let path = self.output_dir.join(Self::file_name(placeholder, mime_type));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiFailure::Unknown(format!("Cannot write image file: {e}")))?;

        info!(path = %path.display(), bytes = bytes.len(), "🖼️ Image saved");
        Ok(path.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl GenerationBackend for ImageService {
    fn service(&self) -> ServiceKind {
        ServiceKind::Image
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<BackendResponse, ApiFailure> {
        if self.api_key.is_empty() {
            return Err(ApiFailure::AuthenticationFailed);
        }

        let model = request
            .params
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&self.model)
            .to_string();
        let placeholder = request.params.get("placeholder").and_then(|p| p.as_str());

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.payload }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
        });
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);

        let request_start = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        // Streaming endpoints answer with a list of chunks
        let response_json = match read_json(response).await? {
            serde_json::Value::Array(chunks) => chunks
                .into_iter()
                .next()
                .ok_or_else(|| ApiFailure::InvalidResponse("Empty response".to_string()))?,
            other => other,
        };

        if let Some(failure) = embedded_error(&response_json) {
            return Err(failure);
        }
        if response_json
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .is_some()
        {
            return Err(ApiFailure::ContentPolicyViolation);
        }

        let parts = response_json
            .get("candidates")
            .and_then(|candidates| candidates.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.as_array())
            .ok_or_else(|| ApiFailure::InvalidResponse("No candidates in response".to_string()))?;

        let mut reference = None;
        for part in parts {
            if let Some(inline) = part.get("inlineData") {
                let mime_type = inline.get("mimeType").and_then(|m| m.as_str()).unwrap_or("image/png");
                if !mime_type.starts_with("image/") {
                    continue;
                }
                let data = inline
                    .get("data")
                    .and_then(|d| d.as_str())
                    .ok_or_else(|| ApiFailure::InvalidResponse("Inline image without data".to_string()))?;
                reference = Some(self.store_inline(placeholder, mime_type, data).await?);
                break;
            }
            if let Some(uri) = part.get("fileData").and_then(|f| f.get("fileUri")).and_then(|u| u.as_str()) {
                reference = Some(uri.to_string());
                break;
            }
        }

        let output = reference.ok_or_else(|| ApiFailure::InvalidResponse("No image data found in response".to_string()))?;

        Ok(BackendResponse {
            output,
            units: 1,
            model_used: model,
            response_time: request_start.elapsed(),
        })
    }
}
