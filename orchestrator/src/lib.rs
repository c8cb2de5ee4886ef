//! Orchestrator library for turning keyword CSVs into SEO articles
//!
//! Reads keyword records, drives each one through a content-then-images
//! pipeline on a bounded worker pool and writes one JSON document per record
//! plus a batch summary. The generation clients, and the rate limiter, cache
//! and budget they share, come from the `generator` crate.

pub mod core;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use core::{ArticleParser, KeywordPipeline, PipelineServices, PipelineSettings, PipelineState, PromptHandler};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{BatchOrchestrator, BatchRun};
pub use traits::{KeywordBatch, KeywordSource, OutputWriter};
pub use types::*;
