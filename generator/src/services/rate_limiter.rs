//! Sliding-window rate limiter, one independent window per service
//!
//! Each service keeps a queue of grants (time, units) inside its window span.
//! A caller whose units do not fit waits until the oldest grants age out. The
//! per-service lock is held across that wait, so grants are serialized and
//! waiters are admitted in arrival order; other services are never touched.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use shared::{RateLimitConfig, ServiceKind};

#[derive(Debug, Clone, Copy)]
struct Grant {
    at: Instant,
    units: u64,
}

#[derive(Debug)]
struct ServiceWindow {
    ceiling: u64,
    span: Duration,
    grants: Mutex<VecDeque<Grant>>,
}

impl ServiceWindow {
    fn evict_expired(&self, grants: &mut VecDeque<Grant>, now: Instant) {
        while let Some(oldest) = grants.front() {
            if now.duration_since(oldest.at) >= self.span {
                grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until enough of the oldest grants expire for `units` to fit
    fn wait_for_capacity(&self, grants: &VecDeque<Grant>, now: Instant, used: u64, units: u64) -> Duration {
        let mut freed = 0;
        for grant in grants {
            freed += grant.units;
            if used - freed + units <= self.ceiling {
                return (grant.at + self.span).saturating_duration_since(now);
            }
        }
        self.span
    }
}

/// Shared rate limiter for all generation clients
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<ServiceKind, ServiceWindow>,
}

impl RateLimiter {
    /// Create limiter from configuration (a ceiling of 0 means unlimited)
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(
            ServiceKind::all()
                .into_iter()
                .map(|service| (service, config.ceiling_for(service))),
            config.window,
        )
    }

    /// Create limiter with explicit per-service ceilings over one window span
    pub fn with_limits(limits: impl IntoIterator<Item = (ServiceKind, u64)>, window: Duration) -> Self {
        let windows = limits
            .into_iter()
            .filter(|(_, ceiling)| *ceiling > 0)
            .map(|(service, ceiling)| {
                (
                    service,
                    ServiceWindow {
                        ceiling,
                        span: window,
                        grants: Mutex::new(VecDeque::new()),
                    },
                )
            })
            .collect();
        Self { windows }
    }

    /// Limiter that never delays anyone
    pub fn unlimited() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    /// Configured ceiling for a service, `None` when unlimited
    pub fn ceiling(&self, service: ServiceKind) -> Option<u64> {
        self.windows.get(&service).map(|w| w.ceiling)
    }

    /// Wait until `cost_units` fit in the service's window, then record them.
    ///
    /// Never rejects. A request larger than the ceiling is clamped to the
    /// ceiling, so it is admitted once the window is empty. Returns the time
    /// spent waiting.
    pub async fn acquire(&self, service: ServiceKind, cost_units: u64) -> Duration {
        let Some(window) = self.windows.get(&service) else {
            return Duration::ZERO;
        };

        let units = cost_units.min(window.ceiling);
        let started = Instant::now();
        let mut grants = window.grants.lock().await;

        loop {
            let now = Instant::now();
            window.evict_expired(&mut grants, now);
            let used: u64 = grants.iter().map(|g| g.units).sum();

            if used + units <= window.ceiling {
                grants.push_back(Grant { at: now, units });
                return now.duration_since(started);
            }

            let wait = window.wait_for_capacity(&grants, now, used, units);
            debug!(
                service = %service,
                used,
                requested = units,
                ceiling = window.ceiling,
                wait_ms = wait.as_millis() as u64,
                "⏳ Rate limit window full, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Units currently counted inside the service's window
    pub async fn window_usage(&self, service: ServiceKind) -> u64 {
        let Some(window) = self.windows.get(&service) else {
            return 0;
        };
        let mut grants = window.grants.lock().await;
        window.evict_expired(&mut grants, Instant::now());
        grants.iter().map(|g| g.units).sum()
    }
}
