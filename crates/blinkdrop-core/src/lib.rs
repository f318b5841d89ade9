//! # Blinkdrop Core
//!
//! Types shared by every Blinkdrop component.
//!
//! This crate provides:
//! - Session identifiers: the high-entropy [`Token`] and its typeable
//!   [`ShortCode`] alias
//! - The identifier generator backed by the OS random source
//! - The message [`Envelope`] and its structural validator
//! - Common error types
//!
//! Nothing here performs I/O. Storage and delivery guarantees live in
//! `blinkdrop-relay`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod envelope;
pub mod error;
pub mod identifier;

pub use envelope::{EncryptedEnvelope, Envelope, PlainEnvelope};
pub use error::{Error, Result};
pub use identifier::{Identifier, Redacted, ShortCode, Token};

/// Envelope format version accepted by the relay
pub const ENVELOPE_VERSION: u64 = 1;

/// Maximum plaintext size in UTF-8 bytes (50 KiB)
pub const MAX_PLAINTEXT_BYTES: usize = 50 * 1024;

/// Random bytes in a token (128 bits)
pub const TOKEN_BYTES: usize = 16;

/// Random bytes behind a short code (40 bits)
pub const SHORT_CODE_BYTES: usize = 5;

/// Symbols in a short code
pub const SHORT_CODE_LEN: usize = 8;

/// Short code alphabet: A-Z followed by 2-7
pub const SHORT_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::envelope::{EncryptedEnvelope, Envelope, PlainEnvelope};
    pub use crate::error::{Error, Result};
    pub use crate::identifier::{Identifier, ShortCode, Token};
}
