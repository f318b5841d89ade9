//! Message envelopes
//!
//! An envelope is either plaintext or a client-encrypted payload. The
//! two variants are discriminated on the wire by the `encrypted` boolean:
//!
//! ```json
//! {"version": 1, "encrypted": false, "text": "hello"}
//! {"version": 1, "encrypted": true, "kdf": "PBKDF2", "hash": "SHA-256",
//!  "iterations": 250000, "salt_b64": "...", "iv_b64": "...",
//!  "ciphertext_b64": "..."}
//! ```
//!
//! The relay checks the shape and field types of encrypted envelopes but
//! never sees the PIN and cannot decrypt them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::{ENVELOPE_VERSION, MAX_PLAINTEXT_BYTES};

/// Key derivation function name for encrypted envelopes
pub const KDF_PBKDF2: &str = "PBKDF2";

/// Hash name for encrypted envelopes
pub const HASH_SHA256: &str = "SHA-256";

const PLAIN_FIELDS: &[&str] = &["version", "encrypted", "text"];
const ENCRYPTED_FIELDS: &[&str] = &[
    "version",
    "encrypted",
    "kdf",
    "hash",
    "iterations",
    "salt_b64",
    "iv_b64",
    "ciphertext_b64",
];

/// Message payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// Plaintext message
    Plain(PlainEnvelope),
    /// Client-encrypted message
    Encrypted(EncryptedEnvelope),
}

/// Plaintext envelope body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainEnvelope {
    /// Message text
    pub text: String,
}

/// Encrypted envelope body. PBKDF2 over SHA-256 is implied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// PBKDF2 iteration count
    pub iterations: u32,
    /// KDF salt
    pub salt: Vec<u8>,
    /// Cipher IV
    pub iv: Vec<u8>,
    /// Opaque ciphertext
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Plaintext envelope
    pub fn plain(text: impl Into<String>) -> Self {
        Envelope::Plain(PlainEnvelope { text: text.into() })
    }

    /// Validate an untyped request payload.
    ///
    /// Enforces the closed schema and the plaintext size cap. Oversized
    /// plaintext is rejected, never truncated. Encrypted envelopes have no
    /// size cap here.
    pub fn validate(raw: &Value) -> Result<Self> {
        let envelope = Self::from_value(raw)?;

        if let Envelope::Plain(plain) = &envelope {
            let size = plain.text.len();
            if size > MAX_PLAINTEXT_BYTES {
                return Err(Error::PayloadTooLarge {
                    size,
                    max: MAX_PLAINTEXT_BYTES,
                });
            }
        }

        Ok(envelope)
    }

    /// Shape check without the size cap, used when decoding stored records
    pub fn from_value(raw: &Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| Error::invalid("envelope must be an object"))?;

        match object.get("version") {
            // JSON numbers compare by value, so 1.0 is version 1
            Some(version) if version.as_f64() == Some(ENVELOPE_VERSION as f64) => {}
            Some(other) => return Err(Error::invalid(format!("unsupported version {}", other))),
            None => return Err(Error::invalid("missing version")),
        }

        match object.get("encrypted").and_then(Value::as_bool) {
            Some(false) => {
                reject_unknown_fields(object, PLAIN_FIELDS)?;
                let text = object
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid("text must be a string"))?;
                Ok(Envelope::plain(text))
            }
            Some(true) => {
                reject_unknown_fields(object, ENCRYPTED_FIELDS)?;
                expect_literal(object, "kdf", KDF_PBKDF2)?;
                expect_literal(object, "hash", HASH_SHA256)?;

                let iterations = object
                    .get("iterations")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| Error::invalid("iterations must be a positive integer"))?;

                Ok(Envelope::Encrypted(EncryptedEnvelope {
                    iterations,
                    salt: base64_field(object, "salt_b64")?,
                    iv: base64_field(object, "iv_b64")?,
                    ciphertext: base64_field(object, "ciphertext_b64")?,
                }))
            }
            None => Err(Error::invalid("encrypted must be a boolean")),
        }
    }

    /// Whether this is the encrypted variant
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Envelope::Encrypted(_))
    }

    /// Wire representation
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Plain(plain) => serde_json::json!({
                "version": ENVELOPE_VERSION,
                "encrypted": false,
                "text": plain.text,
            }),
            Envelope::Encrypted(enc) => serde_json::json!({
                "version": ENVELOPE_VERSION,
                "encrypted": true,
                "kdf": KDF_PBKDF2,
                "hash": HASH_SHA256,
                "iterations": enc.iterations,
                "salt_b64": STANDARD.encode(&enc.salt),
                "iv_b64": STANDARD.encode(&enc.iv),
                "ciphertext_b64": STANDARD.encode(&enc.ciphertext),
            }),
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Envelope::from_value(&value).map_err(D::Error::custom)
    }
}

fn reject_unknown_fields(object: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
    match object.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(Error::invalid(format!("unexpected field {}", key))),
        None => Ok(()),
    }
}

fn expect_literal(object: &Map<String, Value>, field: &str, expected: &str) -> Result<()> {
    match object.get(field).and_then(Value::as_str) {
        Some(value) if value == expected => Ok(()),
        _ => Err(Error::invalid(format!("{} must be {}", field, expected))),
    }
}

fn base64_field(object: &Map<String, Value>, field: &str) -> Result<Vec<u8>> {
    let encoded = object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid(format!("{} must be a string", field)))?;

    STANDARD
        .decode(encoded)
        .map_err(|e| Error::invalid(format!("{} is not base64: {}", field, e)))
}
