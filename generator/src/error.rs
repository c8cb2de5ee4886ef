//! Generation error types

use shared::{ServiceErrorKind, ServiceKind};
use thiserror::Error;

/// Result type for generation calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure of a single `generate` call after cache, budget, rate limit and retries
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Transient failure from {service} service after {attempts} attempt(s): {message}")]
    Transient {
        service: ServiceKind,
        attempts: u32,
        message: String,
    },

    #[error("Permanent failure from {service} service: {message}")]
    Permanent { service: ServiceKind, message: String },

    #[error("Budget exhausted before calling {service} service")]
    BudgetExhausted { service: ServiceKind },

    #[error("Stop requested before calling {service} service")]
    Cancelled { service: ServiceKind },
}

impl ServiceError {
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            ServiceError::Transient { .. } => ServiceErrorKind::Transient,
            ServiceError::Permanent { .. } => ServiceErrorKind::Permanent,
            ServiceError::BudgetExhausted { .. } => ServiceErrorKind::BudgetExhausted,
            ServiceError::Cancelled { .. } => ServiceErrorKind::Cancelled,
        }
    }

    pub fn service(&self) -> ServiceKind {
        match self {
            ServiceError::Transient { service, .. }
            | ServiceError::Permanent { service, .. }
            | ServiceError::BudgetExhausted { service }
            | ServiceError::Cancelled { service } => *service,
        }
    }
}
