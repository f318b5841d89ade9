//! Relay error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Identifier is empty or its short code is unknown or expired
    #[error("Unknown identifier")]
    UnknownIdentifier,

    /// Envelope failed validation
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

    /// A record was consumed but its bytes do not decode as an envelope
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// TTL of zero seconds
    #[error("TTL must be at least one second")]
    InvalidTtl,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether the caller may retry the whole operation
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Storage(_))
    }
}

impl From<blinkdrop_core::Error> for RelayError {
    fn from(err: blinkdrop_core::Error) -> Self {
        match err {
            blinkdrop_core::Error::InvalidEnvelope(msg) => RelayError::InvalidEnvelope(msg),
            blinkdrop_core::Error::PayloadTooLarge { size, max } => {
                RelayError::PayloadTooLarge { size, max }
            }
            blinkdrop_core::Error::InvalidIdentifier(_) => RelayError::UnknownIdentifier,
        }
    }
}

impl From<sled::Error> for RelayError {
    fn from(err: sled::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for RelayError {
    fn from(err: bincode::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}
