//! Session registry: short code to token aliases
//!
//! Aliases live in their own namespace (`code:{SHORTCODE}`) with their
//! own TTL, independent of any relay record. The relay service deletes an
//! alias as soon as the message behind it is consumed.

use std::sync::Arc;

use blinkdrop_core::{Identifier, ShortCode, Token};
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::kv::KvStore;

const CODE_PREFIX: &str = "code:";

/// Identifiers handed to a new session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionGrant {
    /// Primary identifier
    pub token: Token,
    /// Typeable alias
    pub short_code: ShortCode,
    /// Alias lifetime
    pub expires_in_seconds: u64,
}

/// Outcome of resolving a caller-supplied identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Target token
    pub token: Token,
    /// The alias used, if the identifier was a short code
    pub alias: Option<ShortCode>,
}

/// Alias layer over the token namespace
#[derive(Clone)]
pub struct SessionRegistry {
    kv: Arc<dyn KvStore>,
    session_ttl_secs: u64,
}

impl SessionRegistry {
    /// Create over a backing store
    pub fn new(kv: Arc<dyn KvStore>, session_ttl_secs: u64) -> Self {
        Self {
            kv,
            session_ttl_secs,
        }
    }

    fn key(code: &ShortCode) -> String {
        format!("{}{}", CODE_PREFIX, code.as_str())
    }

    /// Issue a token and short code and register the alias
    pub fn create_session(&self) -> Result<SessionGrant> {
        let token = Token::generate();
        let short_code = ShortCode::generate();

        self.kv.set(
            &Self::key(&short_code),
            token.as_str().as_bytes().to_vec(),
            self.session_ttl_secs,
        )?;

        info!(
            "Created session {} with code {}",
            token.redacted(),
            short_code.redacted()
        );

        Ok(SessionGrant {
            token,
            short_code,
            expires_in_seconds: self.session_ttl_secs,
        })
    }

    /// Map an identifier to its token.
    ///
    /// Short codes must have a live alias. Anything else is used directly
    /// as a token without an existence check.
    pub fn resolve(&self, identifier: &str) -> Result<Resolved> {
        let identifier = Identifier::parse(identifier)?;

        let code = match identifier {
            Identifier::Token(token) => return Ok(Resolved { token, alias: None }),
            Identifier::ShortCode(code) => code,
        };

        let bytes = match self.kv.get(&Self::key(&code))? {
            Some(bytes) => bytes,
            None => {
                debug!("No alias for code {}", code.redacted());
                return Err(RelayError::UnknownIdentifier);
            }
        };

        match String::from_utf8(bytes) {
            Ok(token) if !token.is_empty() => Ok(Resolved {
                token: Token::from_raw(token),
                alias: Some(code),
            }),
            _ => {
                warn!("Alias for code {} is unreadable", code.redacted());
                Err(RelayError::UnknownIdentifier)
            }
        }
    }

    /// Delete an alias. Returns whether it was still live.
    pub fn invalidate(&self, code: &ShortCode) -> Result<bool> {
        let removed = self.kv.delete(&Self::key(code))?;
        debug!("Invalidated code {} (was live: {})", code.redacted(), removed);
        Ok(removed)
    }
}
