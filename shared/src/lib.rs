//! Shared types for the SEO blog generation engine
//!
//! Contains the configuration surface, the request/result value objects that
//! cross the boundary between the generation clients and the batch
//! orchestrator, and process-wide logging setup.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
