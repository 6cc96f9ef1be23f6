//! Error types shared by the presence and signaling components

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by registry, room, and admission operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited")]
    RateLimited,
}

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        CoreError::Unavailable(msg.into())
    }

    /// Wire code for this error
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

/// Wire error codes (sent to clients)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Unavailable,
    RateLimited,
    Internal,
}

impl From<&CoreError> for ErrorCode {
    fn from(e: &CoreError) -> Self {
        match e {
            CoreError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            CoreError::NotFound(_) => ErrorCode::NotFound,
            CoreError::Unavailable(_) => ErrorCode::Unavailable,
            CoreError::RateLimited => ErrorCode::RateLimited,
        }
    }
}

impl ErrorCode {
    /// HTTP status the request layer should answer with
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidArgument => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::RateLimited => 429,
            ErrorCode::Unavailable => 503,
            ErrorCode::Internal => 500,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
