// models/src/errors.rs

use std::io;
pub use thiserror::Error;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use uuid::Error as UuidError;

/// Error taxonomy for the broker. Variants carry the upstream detail as a
/// string so records stay serializable end to end.
#[derive(Debug, Serialize, Deserialize, Error, Clone)]
pub enum BrokerError {
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
    #[error("Upstream returned {status}: {body}")]
    UpstreamError { status: u16, body: String },
    #[error("Timeout error: {0}")]
    TimeoutError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Business rule violated: {0}")]
    BusinessRule(String),
    #[error("An internal error occurred: {0}")]
    InternalError(String),
}

impl BrokerError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        BrokerError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<&str> for BrokerError {
    fn from(error: &str) -> Self {
        BrokerError::InternalError(error.to_string())
    }
}

impl From<SerdeJsonError> for BrokerError {
    fn from(err: SerdeJsonError) -> Self {
        BrokerError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<io::Error> for BrokerError {
    fn from(err: io::Error) -> Self {
        BrokerError::InternalError(format!("IO error: {}", err))
    }
}

impl From<UuidError> for BrokerError {
    fn from(err: UuidError) -> Self {
        BrokerError::InternalError(format!("UUID error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for BrokerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        BrokerError::TimeoutError("operation timed out".into())
    }
}

#[cfg(feature = "redis-errors")]
impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::StorageError(format!("Redis error: {}", err))
    }
}

/// A type alias for a `Result` that returns a `BrokerError` on failure.
pub type BrokerResult<T> = Result<T, BrokerError>;
