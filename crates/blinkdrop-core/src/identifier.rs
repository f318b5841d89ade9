//! Session identifiers and their generator
//!
//! A session is addressed by a [`Token`]: 128 random bits, hex-encoded.
//! Because tokens are awkward to type, each session also gets a
//! [`ShortCode`]: 40 random bits rendered as eight symbols from a
//! 32-symbol alphabet, stored by the relay as an alias of the token.
//!
//! Neither value is checked for uniqueness against storage. A token
//! collision needs on the order of 2^64 draws; a short code collision is
//! far more likely but only lets the newer alias overwrite the older one,
//! which the short TTL bounds.

use std::fmt;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{SHORT_CODE_ALPHABET, SHORT_CODE_BYTES, SHORT_CODE_LEN, TOKEN_BYTES};

/// High-entropy session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Generate a new token from the OS random source
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a new token from the given random source
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a caller-supplied token without checking its format.
    ///
    /// Raw tokens are accepted as-is: an unregistered token is valid and
    /// simply never has a message pending.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Whether this looks like a generated token (32 lowercase hex chars)
    pub fn is_canonical(&self) -> bool {
        self.0.len() == TOKEN_BYTES * 2
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form safe for logs
    pub fn redacted(&self) -> Redacted<'_> {
        Redacted(&self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-typeable alias for a token
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    /// Generate a new short code from the OS random source
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a new short code from the given random source
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SHORT_CODE_BYTES];
        rng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Encode 40 bits as eight 5-bit symbols, most significant first
    pub fn from_bytes(bytes: [u8; SHORT_CODE_BYTES]) -> Self {
        let buffer = bytes
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));

        let code = (0..SHORT_CODE_LEN)
            .rev()
            .map(|group| {
                let index = (buffer >> (group * 5)) & 0x1f;
                char::from(SHORT_CODE_ALPHABET[index as usize])
            })
            .collect();

        Self(code)
    }

    /// Normalize user input and accept it if it matches `^[A-Z2-7]{8}$`.
    ///
    /// Input is trimmed and upper-cased first, so codes are
    /// case-insensitive.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_uppercase();
        if Self::is_valid(&normalized) {
            Some(Self(normalized))
        } else {
            None
        }
    }

    fn is_valid(candidate: &str) -> bool {
        candidate.len() == SHORT_CODE_LEN
            && candidate
                .bytes()
                .all(|b| SHORT_CODE_ALPHABET.contains(&b))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form safe for logs
    pub fn redacted(&self) -> Redacted<'_> {
        Redacted(&self.0)
    }
}

impl fmt::Display for ShortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller-supplied identifier after normalization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    /// Alias to be looked up in the session registry
    ShortCode(ShortCode),
    /// Token used directly
    Token(Token),
}

impl Identifier {
    /// Classify raw input.
    ///
    /// Anything that normalizes to the short-code pattern is a short code;
    /// every other non-empty input is taken verbatim (trimmed) as a token.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidIdentifier("empty identifier".to_string()));
        }

        match ShortCode::parse(trimmed) {
            Some(code) => Ok(Identifier::ShortCode(code)),
            None => Ok(Identifier::Token(Token::from_raw(trimmed))),
        }
    }

    /// Short code, if this identifier is an alias
    pub fn short_code(&self) -> Option<&ShortCode> {
        match self {
            Identifier::ShortCode(code) => Some(code),
            Identifier::Token(_) => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::ShortCode(code) => write!(f, "code:{}", code.redacted()),
            Identifier::Token(token) => write!(f, "token:{}", token.redacted()),
        }
    }
}

/// Identifier prefix for log output
#[derive(Clone, Copy, Debug)]
pub struct Redacted<'a>(&'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "{}…", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_token_format() {
        let token = Token::generate();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.is_canonical());
    }

    #[test]
    fn test_tokens_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Token::generate_with(&mut rng);
        let b = Token::generate_with(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_code_vectors() {
        assert_eq!(ShortCode::from_bytes([0x00; 5]).as_str(), "AAAAAAAA");
        assert_eq!(ShortCode::from_bytes([0xff; 5]).as_str(), "77777777");
        // 0x08 0x42 0x10 0x84 0x21 is 00001 repeated eight times
        assert_eq!(
            ShortCode::from_bytes([0x08, 0x42, 0x10, 0x84, 0x21]).as_str(),
            "BBBBBBBB"
        );
    }

    #[test]
    fn test_short_code_parse_normalizes() {
        let code = ShortCode::parse("  abcd2345\n").unwrap();
        assert_eq!(code.as_str(), "ABCD2345");

        assert!(ShortCode::parse("ABCD234").is_none());
        assert!(ShortCode::parse("ABCD23456").is_none());
        // 0, 1, 8 and 9 are not in the alphabet
        assert!(ShortCode::parse("ABCD2341").is_none());
        assert!(ShortCode::parse("ABCD2348").is_none());
    }

    #[test]
    fn test_identifier_parse() {
        let id = Identifier::parse(" qrst2345 ").unwrap();
        assert_eq!(
            id,
            Identifier::ShortCode(ShortCode::parse("QRST2345").unwrap())
        );

        let raw = "00112233445566778899aabbccddeeff";
        let id = Identifier::parse(&format!("\t{}  ", raw)).unwrap();
        assert_eq!(id, Identifier::Token(Token::from_raw(raw)));
        assert!(id.short_code().is_none());

        assert!(matches!(
            Identifier::parse("   "),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_raw_token_keeps_case() {
        let id = Identifier::parse("NotAHexToken").unwrap();
        match id {
            Identifier::Token(token) => {
                assert_eq!(token.as_str(), "NotAHexToken");
                assert!(!token.is_canonical());
            }
            other => panic!("expected token, got {:?}", other),
        }
    }

    #[test]
    fn test_redacted_hides_tail() {
        let token = Token::from_raw("0123456789abcdef");
        assert_eq!(token.redacted().to_string(), "0123…");
    }

    proptest! {
        #[test]
        fn short_code_always_matches_pattern(bytes in any::<[u8; 5]>()) {
            let code = ShortCode::from_bytes(bytes);
            prop_assert_eq!(code.as_str().len(), 8);
            prop_assert!(code
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)));
        }

        #[test]
        fn short_code_parse_is_case_insensitive(bytes in any::<[u8; 5]>()) {
            let code = ShortCode::from_bytes(bytes);
            let lowered = code.as_str().to_lowercase();
            prop_assert_eq!(ShortCode::parse(&lowered), Some(code));
        }

        #[test]
        fn distinct_inputs_give_distinct_codes(a in any::<[u8; 5]>(), b in any::<[u8; 5]>()) {
            prop_assume!(a != b);
            prop_assert_ne!(ShortCode::from_bytes(a), ShortCode::from_bytes(b));
        }
    }
}
