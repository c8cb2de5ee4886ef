//! Shared error types for the generation engine

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SharedError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Missing required setting: {field}")]
    MissingConfig { field: String },

    #[error("Serialization failed: {message}")]
    SerializationError { message: String },
}

impl SharedError {
    pub fn invalid(field: &str, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
