//! Budget accounting for one batch run
//!
//! A call first reserves its estimated units. The reservation counts against
//! the ceilings until the call finishes, at which point it is either committed
//! with the actual usage (`record`) or returned (`release`). Concurrent callers
//! therefore cannot jointly overshoot a ceiling on estimates alone.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use shared::{BudgetConfig, ServiceKind};
use crate::types::BudgetState;

#[derive(Debug)]
pub struct CostTracker {
    config: BudgetConfig,
    state: Mutex<BudgetState>,
}

impl CostTracker {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BudgetState::default()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(BudgetConfig::unlimited())
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hold `estimated_units` against the budget.
    ///
    /// Returns false when the reservation would cross any ceiling. The
    /// exhausted flag only latches when the call could not fit even with no
    /// other call in flight; a denial caused by in-flight reservations alone
    /// leaves the budget open for when those calls settle.
    pub fn reserve(&self, service: ServiceKind, estimated_units: u64) -> bool {
        let mut state = self.lock();
        if state.exhausted || self.ceiling_reached(&state) {
            state.exhausted = true;
            return false;
        }

        if !self.fits(&state, service, estimated_units, false) {
            state.exhausted = true;
            warn!(
                service = %service,
                requested = estimated_units,
                tokens_consumed = state.tokens_consumed,
                images_consumed = state.images_consumed,
                cost_usd = state.cost_usd,
                "💸 Budget exhausted, denying further calls"
            );
            return false;
        }

        if !self.fits(&state, service, estimated_units, true) {
            debug!(
                service = %service,
                requested = estimated_units,
                tokens_reserved = state.tokens_reserved,
                images_reserved = state.images_reserved,
                "⏳ Budget held by in-flight calls, denying this one"
            );
            return false;
        }

        match service {
            ServiceKind::Content => state.tokens_reserved += estimated_units,
            ServiceKind::Image => state.images_reserved += estimated_units,
        }
        state.cost_reserved_usd += self.config.cost_of(service, estimated_units);
        true
    }

    /// Commit a finished call: drop its reservation and add the actual usage
    pub fn record(&self, service: ServiceKind, reserved_units: u64, actual_units: u64) {
        let mut state = self.lock();
        self.drop_reservation(&mut state, service, reserved_units);
        match service {
            ServiceKind::Content => state.tokens_consumed += actual_units,
            ServiceKind::Image => state.images_consumed += actual_units,
        }
        state.cost_usd += self.config.cost_of(service, actual_units);

        if self.ceiling_reached(&state) && !state.exhausted {
            state.exhausted = true;
            info!(
                tokens_consumed = state.tokens_consumed,
                images_consumed = state.images_consumed,
                cost_usd = state.cost_usd,
                "💸 Budget ceiling reached"
            );
        }
    }

    /// Return the reservation of a call that failed
    pub fn release(&self, service: ServiceKind, reserved_units: u64) {
        let mut state = self.lock();
        self.drop_reservation(&mut state, service, reserved_units);
    }

    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        state.exhausted || self.ceiling_reached(&state)
    }

    /// Zero all counters, called at the start of each batch run
    pub fn reset(&self) {
        *self.lock() = BudgetState::default();
    }

    pub fn snapshot(&self) -> BudgetState {
        self.lock().clone()
    }

    fn drop_reservation(&self, state: &mut BudgetState, service: ServiceKind, units: u64) {
        match service {
            ServiceKind::Content => state.tokens_reserved = state.tokens_reserved.saturating_sub(units),
            ServiceKind::Image => state.images_reserved = state.images_reserved.saturating_sub(units),
        }
        state.cost_reserved_usd = (state.cost_reserved_usd - self.config.cost_of(service, units)).max(0.0);
    }

    fn fits(&self, state: &BudgetState, service: ServiceKind, units: u64, with_reservations: bool) -> bool {
        let (tokens_held, images_held, cost_held) = if with_reservations {
            (state.tokens_reserved, state.images_reserved, state.cost_reserved_usd)
        } else {
            (0, 0, 0.0)
        };
        let units_fit = match service {
            ServiceKind::Content => self
                .config
                .max_tokens
                .map_or(true, |max| state.tokens_consumed + tokens_held + units <= max),
            ServiceKind::Image => self
                .config
                .max_images
                .map_or(true, |max| state.images_consumed + images_held + units <= max),
        };
        let cost = self.config.cost_of(service, units);
        units_fit
            && self
                .config
                .max_cost_usd
                .map_or(true, |max| state.cost_usd + cost_held + cost <= max)
    }

    fn ceiling_reached(&self, state: &BudgetState) -> bool {
        self.config.max_tokens.is_some_and(|max| state.tokens_consumed >= max)
            || self.config.max_images.is_some_and(|max| state.images_consumed >= max)
            || self.config.max_cost_usd.is_some_and(|max| state.cost_usd >= max)
    }
}
