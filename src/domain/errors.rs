use thiserror::Error;

use crate::domain::BulkItemFailure;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Wrong filter format for key \"{key}\": provide a list of allowed values for each key, \
         e.g. {{\"name\": [\"some\", \"more\"], \"category\": [\"only_one\"]}}"
    )]
    InvalidFilterFormat { key: String },

    #[error("Invalid query template: {0}")]
    InvalidQueryTemplate(String),

    #[error("{} of {attempted} records rejected by the engine", failures.len())]
    PartialWriteFailure {
        attempted: usize,
        failures: Vec<BulkItemFailure>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delete on index {index} not confirmed after {waited_ms}ms ({remaining} records remain)")]
    DeleteNotConfirmed {
        index: String,
        remaining: u64,
        waited_ms: u64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_filter(key: impl Into<String>) -> Self {
        Self::InvalidFilterFormat { key: key.into() }
    }

    pub fn invalid_template(msg: impl Into<String>) -> Self {
        Self::InvalidQueryTemplate(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn write_failures(&self) -> Option<&[BulkItemFailure]> {
        match self {
            Self::PartialWriteFailure { failures, .. } => Some(failures),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
