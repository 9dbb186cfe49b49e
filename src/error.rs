//! Error types for a3s-chat

use thiserror::Error;

/// Errors that can occur in a chat session
#[derive(Debug, Error)]
pub enum ChatError {
    /// User input rejected before any request was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the session's current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// No connection credential is held
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote service rejected a request
    #[error("{operation} failed with status {status}: {message}")]
    Service {
        operation: String,
        status: u16,
        message: String,
    },

    /// HTTP client failure (connect, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Duplex transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request signing failure
    #[error("Signing error: {0}")]
    Signing(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request exceeded the configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl ChatError {
    /// True for errors caused by user input rather than a remote failure
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::Validation(_))
    }
}

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;
