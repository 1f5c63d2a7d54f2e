//! Error types for the enclave relay

use hyper::StatusCode;
use thiserror::Error;

/// Errors that can occur while relaying a request
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Topic error: {0}")]
    Topic(String),

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// HTTP status reported to the caller for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same request and expect a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Queue(_)
                | RelayError::Storage(_)
                | RelayError::Topic(_)
                | RelayError::DynamoDb(_)
                | RelayError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
