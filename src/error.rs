use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, KeywordIndexError, VectorIndexError};
use crate::retrieval::RerankError;

/// Main error type for Recollect
#[derive(Error, Debug)]
pub enum RecollectError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// People file could not be parsed
    #[error("Invalid people file {path}: {message}")]
    PeopleFile { path: PathBuf, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    #[error("Keyword index error: {0}")]
    KeywordIndex(#[from] KeywordIndexError),

    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Reranker error: {0}")]
    Rerank(#[from] RerankError),

    /// Invalid built-in or configured pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Recollect operations
pub type Result<T> = std::result::Result<T, RecollectError>;
