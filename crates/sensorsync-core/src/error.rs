//! Common error types for the gateway

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for local store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while routing and synchronizing messages
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Inbound line could not be decoded
    #[error("Malformed message {line:?}: {reason}")]
    MalformedMessage {
        /// The raw line as received
        line: String,
        /// Why decoding failed
        reason: String,
    },

    /// Update attempted for a key that has no cached identity
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// Remote registry did not yield a usable identity
    #[error("Registry failure: {0}")]
    RegistryFailure(String),

    /// Outbound write attempted with no connected link
    #[error("Transport unavailable")]
    TransportUnavailable,

    /// Every radio address has already been handed out
    #[error("Radio address space exhausted")]
    AddressSpaceExhausted,

    /// Local store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Create a malformed-message error from the raw line and a reason
    pub fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a local store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same key already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// IO error while persisting state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
