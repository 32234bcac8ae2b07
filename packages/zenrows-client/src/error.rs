//! Error types for the ZenRows client.

use thiserror::Error;

/// Result type for ZenRows client operations.
pub type Result<T> = std::result::Result<T, ZenRowsError>;

/// ZenRows client errors.
#[derive(Debug, Error)]
pub enum ZenRowsError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request timed out before the gateway responded
    #[error("Request timed out")]
    Timeout,

    /// Network error (connection failed, DNS, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the gateway
    #[error("ZenRows API error ({status}): {message}")]
    Api { status: u16, message: String },
}
