//! Error types for the delivery pipeline.

use thiserror::Error;

/// Delivery pipeline error variants.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Record store error: {0}")]
    Records(#[from] hookrelay_db::DbError),

    #[error("Key/value store error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Job encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Missing configuration: {var}")]
    ConfigMissing { var: String },

    #[error("Invalid configuration for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
