//! Error types for crewlink
//!
//! Provides a unified error type used across all crewlink crates.

use std::path::PathBuf;

/// Main error type for crewlink operations
#[derive(Debug, thiserror::Error)]
pub enum CrewlinkError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Reconnection attempts exhausted after {attempts} tries")]
    MaxReconnectExceeded { attempts: u32 },

    #[error("Outbound queue full, message dropped")]
    QueueOverflow,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // === Auth Errors ===

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Anti-forgery token refresh failed: {0}")]
    ForgeryTokenRefresh(String),

    // === Backend API Errors ===

    #[error("Backend API error: {0}")]
    Api(String),

    // === Storage Errors ===

    #[error("Storage error: {0}")]
    Storage(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrewlinkError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an auth error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a backend API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is recoverable by the connection layer itself
    /// (backoff and reconnect) rather than needing caller intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionClosed)
    }
}

/// Result type alias using CrewlinkError
pub type Result<T> = std::result::Result<T, CrewlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrewlinkError::Auth("missing bearer token".into());
        assert_eq!(err.to_string(), "Authentication error: missing bearer token");
    }

    #[test]
    fn test_max_reconnect_display() {
        let err = CrewlinkError::MaxReconnectExceeded { attempts: 10 };
        assert_eq!(
            err.to_string(),
            "Reconnection attempts exhausted after 10 tries"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(CrewlinkError::ConnectionClosed.is_retryable());
        assert!(CrewlinkError::connection("refused").is_retryable());
        assert!(!CrewlinkError::auth("bad token").is_retryable());
        assert!(!CrewlinkError::MaxReconnectExceeded { attempts: 10 }.is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: CrewlinkError = io_err.into();
        assert!(matches!(err, CrewlinkError::Io(_)));
    }
}
