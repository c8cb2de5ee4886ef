//! Core business logic modules
//!
//! Prompt rendering and article parsing are pure; the pipeline drives one
//! record through the generation services.

pub mod article;
pub mod pipeline;
pub mod prompt;

pub use article::{extract_json_object, slugify, ArticleParser};
pub use pipeline::{KeywordPipeline, PipelineServices, PipelineSettings, PipelineState};
pub use prompt::{PromptHandler, PromptStage};
