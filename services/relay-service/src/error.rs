//! Error types for the relay service

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;
use tracing::error;

use blinkdrop_relay::RelayError;

/// Service error types
#[derive(Debug)]
pub enum ServiceError {
    /// Request body is malformed
    InvalidInput(String),
    /// Short code not found or expired
    UnknownIdentifier,
    /// Envelope failed validation
    InvalidEnvelope(String),
    /// Plaintext over the cap
    PayloadTooLarge { size: usize, max: usize },
    /// Stored record could not be decoded; it has been consumed
    CorruptRecord(String),
    /// Backing store failure, retryable
    Unavailable(String),
    /// Internal error
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            ServiceError::UnknownIdentifier => write!(f, "Unknown identifier"),
            ServiceError::InvalidEnvelope(msg) => write!(f, "Invalid message: {}", msg),
            ServiceError::PayloadTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes exceeds maximum {}", size, max)
            }
            ServiceError::CorruptRecord(_) => write!(f, "Stored message could not be read"),
            ServiceError::Unavailable(_) => write!(f, "Storage temporarily unavailable"),
            ServiceError::Internal(_) => write!(f, "Internal error"),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    code: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::UnknownIdentifier => StatusCode::NOT_FOUND,
            ServiceError::InvalidEnvelope(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::CorruptRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            ServiceError::InvalidInput(_) => "INVALID_INPUT",
            ServiceError::UnknownIdentifier => "UNKNOWN_IDENTIFIER",
            ServiceError::InvalidEnvelope(_) => "INVALID_ENVELOPE",
            ServiceError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServiceError::CorruptRecord(_) => "CORRUPT_RECORD",
            ServiceError::Unavailable(_) => "STORE_UNAVAILABLE",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        };

        match self {
            ServiceError::CorruptRecord(detail)
            | ServiceError::Unavailable(detail)
            | ServiceError::Internal(detail) => error!("{}: {}", code, detail),
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            ok: false,
            error: self.to_string(),
            code: code.to_string(),
        })
    }
}

impl From<RelayError> for ServiceError {
    fn from(err: RelayError) -> Self {
        if err.is_transient() {
            return ServiceError::Unavailable(err.to_string());
        }

        match err {
            RelayError::UnknownIdentifier => ServiceError::UnknownIdentifier,
            RelayError::InvalidEnvelope(msg) => ServiceError::InvalidEnvelope(msg),
            RelayError::PayloadTooLarge { size, max } => {
                ServiceError::PayloadTooLarge { size, max }
            }
            RelayError::CorruptRecord(msg) => ServiceError::CorruptRecord(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}
