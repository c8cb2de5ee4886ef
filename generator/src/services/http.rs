//! Small helpers shared by the HTTP backends

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Response;
use shared::ApiFailure;

/// Build a client with the per-request HTTP timeout applied
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Classify a transport-level failure
pub fn transport_failure(error: reqwest::Error) -> ApiFailure {
    if error.is_timeout() {
        ApiFailure::Timeout
    } else {
        ApiFailure::NetworkError(error.to_string())
    }
}

/// `Retry-After` in whole seconds, the only form the providers send
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Turn a non-success response into a failure, or parse the JSON body
pub async fn read_json(response: Response) -> Result<serde_json::Value, ApiFailure> {
    let status = response.status();
    if !status.is_success() {
        let wait = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        return Err(ApiFailure::from_status(status.as_u16(), &body, wait));
    }

    response
        .json()
        .await
        .map_err(|e| ApiFailure::InvalidResponse(format!("Failed to parse response: {e}")))
}

/// Some providers answer 200 with an `error` object in the body
pub fn embedded_error(body: &serde_json::Value) -> Option<ApiFailure> {
    let error = body.get("error")?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    let code = error.get("code").and_then(|c| c.as_u64()).unwrap_or(500) as u16;
    Some(ApiFailure::from_status(code, &message, None))
}
