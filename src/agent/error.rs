//! Model call errors

use thiserror::Error;

/// Error types for model client operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Classify an unsuccessful HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => AgentError::Auth(message),
            413 => AgentError::PayloadTooLarge(message),
            400 | 404 | 422 => AgentError::InvalidRequest(message),
            _ => AgentError::Api { status, message },
        }
    }

    /// Network, timeout, rate limit and server errors are worth another try
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Network(_) | AgentError::Timeout(_) => true,
            AgentError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
