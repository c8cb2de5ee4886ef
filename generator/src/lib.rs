//! Generation library for the SEO blog engine
//!
//! This library wraps the two remote generation services (article content and
//! images) behind clients that share a sliding-window rate limiter, a
//! fingerprint-keyed response cache and a run-scoped cost tracker.

pub mod core;
pub mod error;
pub mod services;
pub mod traits;
pub mod types;

// Re-export main types
pub use error::{ServiceError, ServiceResult};
pub use services::*;
pub use traits::*;
pub use types::*;
