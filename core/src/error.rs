use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error in '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("Meteorology unavailable at simulation time {time}: {reason}")]
    MetUnavailable { time: DateTime<Utc>, reason: String },

    #[error("Malformed meteorology at simulation time {time}: {reason}")]
    MetMalformed { time: DateTime<Utc>, reason: String },

    #[error("Meteorology not initialized")]
    MetNotInitialized,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SimError::Config { field: field.into(), reason: reason.into() }
    }
}

pub type SimResult<T> = Result<T, SimError>;
