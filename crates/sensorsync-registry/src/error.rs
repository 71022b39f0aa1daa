//! Error types for registry operations

use thiserror::Error;

/// Result type alias for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while talking to the remote device registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Base URL cannot have resource paths appended
    #[error("Invalid registry base URL: {0}")]
    InvalidBaseUrl(String),

    /// No response within the configured timeout
    #[error("Registry request timed out")]
    Timeout,

    /// Response body was not the expected JSON document
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Response carried no device identity
    #[error("Response without device identity (status {status})")]
    MissingIdentity { status: u16 },

    /// Transport-level failure reported by a non-HTTP transport
    #[error("Transport error: {0}")]
    Transport(String),
}
