//! Generator-specific data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::GenerationResult;
use std::fmt;
use std::time::Duration;

/// Raw successful reply from a remote service
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub output: String,
    /// Units reported by the service; 0 when it reported none
    pub units: u64,
    pub model_used: String,
    pub response_time: Duration,
}

/// Content-addressed cache key (hex SHA-256 of the canonical request)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, enough for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored result and the instant after which it must not be served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: GenerationResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Running spend totals for one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub tokens_consumed: u64,
    pub images_consumed: u64,
    pub cost_usd: f64,
    /// Units held by reservations whose calls have not finished
    pub tokens_reserved: u64,
    pub images_reserved: u64,
    pub cost_reserved_usd: f64,
    pub exhausted: bool,
}

/// Per-service call statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub budget_denials: u64,
    pub cancelled_requests: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub units_consumed: u64,
    pub total_response_time_ms: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ServiceStats {
    pub fn average_response_time_ms(&self) -> u64 {
        if self.successful_requests == 0 {
            0
        } else {
            self.total_response_time_ms / self.successful_requests
        }
    }
}
