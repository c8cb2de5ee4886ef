//! Core shared types and identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// External generation services the engine talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Content,
    Image,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Content => "content",
            ServiceKind::Image => "image",
        }
    }

    pub fn all() -> [ServiceKind; 2] {
        [ServiceKind::Content, ServiceKind::Image]
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "content" | "text" => Ok(ServiceKind::Content),
            "image" => Ok(ServiceKind::Image),
            _ => Err(format!("Unknown service: {s}")),
        }
    }
}

/// A single call to be made against one external service.
///
/// `payload` is the rendered prompt (content) or the alt-text description
/// (image); `params` holds model and generation parameters. Both take part in
/// the cache fingerprint; `estimated_units` and `system` do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub service: ServiceKind,
    pub payload: String,
    pub params: serde_json::Value,
    pub estimated_units: u64,
    /// Fully rendered system message for content calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl GenerationRequest {
    pub fn content(prompt: impl Into<String>, params: serde_json::Value, estimated_units: u64) -> Self {
        Self {
            service: ServiceKind::Content,
            payload: prompt.into(),
            params,
            estimated_units,
            system: None,
        }
    }

    pub fn image(description: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            service: ServiceKind::Image,
            payload: description.into(),
            params,
            estimated_units: 1,
            system: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Payload with surrounding whitespace trimmed and inner runs collapsed
    pub fn normalized_payload(&self) -> String {
        self.payload.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Canonical byte form used for fingerprinting.
    ///
    /// `serde_json` maps are ordered, so parameter key order never matters.
    pub fn canonical_form(&self) -> String {
        format!(
            "{}\u{0}{}\u{0}{}",
            self.service,
            self.normalized_payload(),
            self.params
        )
    }
}

/// Output of one successful generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub service: ServiceKind,
    /// Article text for content calls, image reference for image calls
    pub output: String,
    /// Usage units consumed (tokens or images)
    pub units: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cache_hit: bool,
}

impl GenerationResult {
    pub fn new(service: ServiceKind, output: impl Into<String>, units: u64) -> Self {
        Self {
            service,
            output: output.into(),
            units,
            created_at: Utc::now(),
            cache_hit: false,
        }
    }
}

/// Coarse classification of a failed generation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    Transient,
    Permanent,
    BudgetExhausted,
    Cancelled,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Transient => write!(f, "transient"),
            ServiceErrorKind::Permanent => write!(f, "permanent"),
            ServiceErrorKind::BudgetExhausted => write!(f, "budget_exhausted"),
            ServiceErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// API failure reasons for external service requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiFailure {
    /// Authentication failed (invalid API key)
    AuthenticationFailed,
    /// Rate limit exceeded, with the server's suggested wait if any
    RateLimitExceeded { retry_after: Option<Duration> },
    /// Invalid request format or parameters
    InvalidRequest(String),
    /// Response arrived but could not be interpreted
    InvalidResponse(String),
    /// Network/connection error
    NetworkError(String),
    /// Server error from provider
    ServerError(String),
    /// Request timeout
    Timeout,
    /// Content policy violation
    ContentPolicyViolation,
    /// Service temporarily unavailable
    ServiceUnavailable,
    /// Unknown or unhandled error
    Unknown(String),
}

impl ApiFailure {
    /// Map a non-success HTTP status to a failure
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ApiFailure::AuthenticationFailed,
            400 | 404 | 413 | 422 => {
                if body.contains("content_policy") || body.contains("SAFETY") {
                    ApiFailure::ContentPolicyViolation
                } else {
                    ApiFailure::InvalidRequest(format!("HTTP {status}: {}", truncate(body, 200)))
                }
            }
            408 => ApiFailure::Timeout,
            429 => ApiFailure::RateLimitExceeded { retry_after },
            503 => ApiFailure::ServiceUnavailable,
            500..=599 => ApiFailure::ServerError(format!("HTTP {status}")),
            _ => ApiFailure::Unknown(format!("HTTP {status}: {}", truncate(body, 200))),
        }
    }

    /// Whether the call may succeed if simply tried again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiFailure::RateLimitExceeded { .. }
                | ApiFailure::ServerError(_)
                | ApiFailure::ServiceUnavailable
                | ApiFailure::NetworkError(_)
                | ApiFailure::Timeout
        )
    }

    /// Server-provided minimum wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiFailure::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiFailure::AuthenticationFailed => write!(f, "authentication failed"),
            ApiFailure::RateLimitExceeded { retry_after: Some(d) } => {
                write!(f, "rate limit exceeded (retry after {}ms)", d.as_millis())
            }
            ApiFailure::RateLimitExceeded { retry_after: None } => write!(f, "rate limit exceeded"),
            ApiFailure::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            ApiFailure::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            ApiFailure::NetworkError(msg) => write!(f, "network error: {msg}"),
            ApiFailure::ServerError(msg) => write!(f, "server error: {msg}"),
            ApiFailure::Timeout => write!(f, "request timed out"),
            ApiFailure::ContentPolicyViolation => write!(f, "content policy violation"),
            ApiFailure::ServiceUnavailable => write!(f, "service unavailable"),
            ApiFailure::Unknown(msg) => write!(f, "unknown failure: {msg}"),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
