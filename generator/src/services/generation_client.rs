//! Generation client: one remote backend wrapped in the full call policy
//!
//! Per request the order is fixed: cache lookup, stop check, budget
//! reservation, then up to `max_attempts` rate-limited backend calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use shared::{ApiFailure, EngineConfig, GenerationRequest, GenerationResult, RetryConfig, ServiceKind};
use crate::core::{fingerprint, retry_delay};
use crate::error::{ServiceError, ServiceResult};
use crate::services::{CostTracker, RateLimiter, ResponseCache, UsageTracker};
use crate::traits::{GenerationBackend, Generator};
use crate::types::BackendResponse;

/// Resources shared by every client of one batch run
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub cost_tracker: Arc<CostTracker>,
    pub usage: UsageTracker,
    pub should_stop: Arc<AtomicBool>,
    pub retry: RetryConfig,
    pub call_timeout: Duration,
}

impl ClientContext {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            cache: Arc::new(ResponseCache::new(&config.cache)),
            cost_tracker: Arc::new(CostTracker::new(config.budget.clone())),
            usage: UsageTracker::new(),
            should_stop: Arc::new(AtomicBool::new(false)),
            retry: config.retry.clone(),
            call_timeout: config.batch.call_timeout,
        }
    }

    /// Ask all clients to stop issuing new external calls
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }
}

pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    ctx: ClientContext,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, ctx: ClientContext) -> Self {
        Self { backend, ctx }
    }

    pub fn service(&self) -> ServiceKind {
        self.backend.service()
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Call the backend until success, a permanent failure, or attempts run out
    async fn call_with_retries(&self, request: &GenerationRequest, units: u64) -> ServiceResult<BackendResponse> {
        let service = self.service();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 && self.ctx.is_stopping() {
                return Err(ServiceError::Cancelled { service });
            }

            let failure = match self.attempt_once(request, units).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            match retry_delay(&failure, attempt, &self.ctx.retry) {
                Some(delay) => {
                    self.ctx.usage.record_retry(service).await;
                    warn!(
                        service = %service,
                        attempt,
                        max_attempts = self.ctx.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "🔄 Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                None if failure.is_retryable() => {
                    return Err(ServiceError::Transient {
                        service,
                        attempts: attempt,
                        message: failure.to_string(),
                    });
                }
                None => {
                    return Err(ServiceError::Permanent {
                        service,
                        message: failure.to_string(),
                    });
                }
            }
        }
    }

    /// One rate-limited backend call. Both the wait and the call are bounded
    /// by the call timeout; either expiring counts as a timeout failure.
    async fn attempt_once(&self, request: &GenerationRequest, units: u64) -> Result<BackendResponse, ApiFailure> {
        let service = self.service();
        let timeout = self.ctx.call_timeout;

        let waited = tokio::time::timeout(timeout, self.ctx.rate_limiter.acquire(service, units))
            .await
            .map_err(|_| ApiFailure::Timeout)?;
        if !waited.is_zero() {
            debug!(
                service = %service,
                waited_ms = waited.as_millis() as u64,
                ceiling = ?self.ctx.rate_limiter.ceiling(service),
                "⏳ Rate limiter admitted request"
            );
        }

        match tokio::time::timeout(timeout, self.backend.invoke(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiFailure::Timeout),
        }
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(&self, request: GenerationRequest) -> ServiceResult<GenerationResult> {
        let service = self.service();
        let key = fingerprint(&request);

        if let Some(hit) = self.ctx.cache.get(&key).await {
            self.ctx.usage.record_cache_hit(service).await;
            debug!(service = %service, fingerprint = key.short(), "🎯 Cache hit");
            return Ok(hit);
        }

        if self.ctx.is_stopping() {
            self.ctx.usage.record_failure(service, shared::ServiceErrorKind::Cancelled).await;
            return Err(ServiceError::Cancelled { service });
        }

        let estimate = request.estimated_units;
        if !self.ctx.cost_tracker.reserve(service, estimate) {
            self.ctx.usage.record_failure(service, shared::ServiceErrorKind::BudgetExhausted).await;
            return Err(ServiceError::BudgetExhausted { service });
        }

        let started = Instant::now();
        match self.call_with_retries(&request, estimate).await {
            Ok(response) => {
                let units = if response.units > 0 { response.units } else { estimate };
                self.ctx.cost_tracker.record(service, estimate, units);

                let result = GenerationResult::new(service, response.output, units);
                self.ctx.cache.put(key.clone(), result.clone(), self.ctx.cache.ttl()).await;
                self.ctx.usage.record_success(service, started.elapsed(), units).await;

                info!(
                    service = %service,
                    model = %response.model_used,
                    units,
                    fingerprint = key.short(),
                    "✨ Generation succeeded"
                );
                Ok(result)
            }
            Err(error) => {
                self.ctx.cost_tracker.release(service, estimate);
                self.ctx.usage.record_failure(service, error.kind()).await;
                warn!(service = %service, error = %error, "❌ Generation failed");
                Err(error)
            }
        }
    }
}
