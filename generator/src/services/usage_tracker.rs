//! Per-service call statistics

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use shared::{ServiceErrorKind, ServiceKind};
use crate::types::ServiceStats;

/// In-memory statistics shared by all clients of a run
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    stats: Arc<RwLock<HashMap<ServiceKind, ServiceStats>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, service: ServiceKind, response_time: Duration, units: u64) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(service).or_default();

        entry.total_requests += 1;
        entry.successful_requests += 1;
        entry.units_consumed += units;
        entry.total_response_time_ms += response_time.as_millis() as u64;
        entry.last_used = Some(Utc::now());

        debug!(
            service = %service,
            response_time_ms = response_time.as_millis() as u64,
            units,
            "📊 Recorded success"
        );
    }

    pub async fn record_failure(&self, service: ServiceKind, kind: ServiceErrorKind) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(service).or_default();

        entry.total_requests += 1;
        entry.failed_requests += 1;
        match kind {
            ServiceErrorKind::Transient => entry.transient_failures += 1,
            ServiceErrorKind::Permanent => entry.permanent_failures += 1,
            ServiceErrorKind::BudgetExhausted => entry.budget_denials += 1,
            ServiceErrorKind::Cancelled => entry.cancelled_requests += 1,
        }
        entry.last_used = Some(Utc::now());

        debug!(service = %service, kind = %kind, "📊 Recorded failure");
    }

    pub async fn record_retry(&self, service: ServiceKind) {
        self.stats.write().await.entry(service).or_default().retries += 1;
    }

    /// Cache hits are not requests against the service and do not count as such
    pub async fn record_cache_hit(&self, service: ServiceKind) {
        self.stats.write().await.entry(service).or_default().cache_hits += 1;
    }

    pub async fn get_stats(&self) -> HashMap<ServiceKind, ServiceStats> {
        self.stats.read().await.clone()
    }

    pub async fn reset(&self) {
        self.stats.write().await.clear();
    }
}
