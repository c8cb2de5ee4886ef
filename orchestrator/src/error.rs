//! Orchestrator-specific error types

use std::path::PathBuf;

use generator::ServiceError;
use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid keyword record at row {row}: {message}")]
    ValidationError { row: usize, message: String },

    #[error("Cannot read keyword input {path}: {message}")]
    InputError { path: PathBuf, message: String },

    #[error("Cannot write output {path}: {message}")]
    OutputError { path: PathBuf, message: String },

    #[error("Prompt template error: {message}")]
    TemplateError { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Generation failed: {0}")]
    Service(#[from] ServiceError),

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl OrchestratorError {
    pub fn output(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::OutputError {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn input(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::InputError {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
