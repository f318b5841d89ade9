//! Error types for Blinkdrop core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Envelope does not match the accepted schema
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Plaintext exceeds the size cap
    #[error("Payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Plaintext length in bytes
        size: usize,
        /// Largest accepted plaintext
        max: usize,
    },

    /// Identifier is empty after normalization
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidEnvelope(msg.into())
    }
}
