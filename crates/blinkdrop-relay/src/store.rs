//! Relay store: at most one pending envelope per token
//!
//! Records live under `msg:{token}`. A new `put` replaces whatever was
//! pending (last write wins). `take_once` consumes the record with the
//! backing store's atomic get-and-delete, so concurrent receivers cannot
//! both observe it. Expiry belongs to the backing store; this layer never
//! sweeps.

use std::sync::Arc;

use blinkdrop_core::{Envelope, Token};
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::kv::KvStore;

const MESSAGE_PREFIX: &str = "msg:";

/// Token-keyed envelope storage
#[derive(Clone)]
pub struct RelayStore {
    kv: Arc<dyn KvStore>,
}

impl RelayStore {
    /// Create over a backing store
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(token: &Token) -> String {
        format!("{}{}", MESSAGE_PREFIX, token.as_str())
    }

    /// Store an envelope for a token, overwriting any pending one
    pub fn put(&self, token: &Token, envelope: &Envelope, ttl_secs: u64) -> Result<()> {
        let bytes = serde_json::to_vec(envelope)
            .map_err(|e| RelayError::Storage(format!("encode envelope: {}", e)))?;

        self.kv.set(&Self::key(token), bytes, ttl_secs)?;
        debug!("Put envelope for {} (ttl {}s)", token.redacted(), ttl_secs);
        Ok(())
    }

    /// Atomically consume the pending envelope.
    ///
    /// `Ok(None)` means nothing is pending (never sent, already taken, or
    /// expired). `CorruptRecord` means a record was consumed but could not
    /// be decoded; it is gone either way.
    pub fn take_once(&self, token: &Token) -> Result<Option<Envelope>> {
        let bytes = match self.kv.take(&Self::key(token))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let envelope = serde_json::from_slice::<serde_json::Value>(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|value| Envelope::from_value(&value).map_err(|e| e.to_string()));

        match envelope {
            Ok(envelope) => {
                debug!("Took envelope for {}", token.redacted());
                Ok(Some(envelope))
            }
            Err(reason) => {
                warn!("Consumed unreadable record for {}: {}", token.redacted(), reason);
                Err(RelayError::CorruptRecord(reason))
            }
        }
    }

    /// Write raw bytes under a token's key, bypassing encoding
    #[cfg(test)]
    pub(crate) fn put_raw(&self, token: &Token, bytes: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.kv.set(&Self::key(token), bytes, ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{ManualClock, MemoryKvStore};
    use std::time::Duration;

    fn store_with_clock() -> (RelayStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let kv = Arc::new(MemoryKvStore::with_clock(clock.clone()));
        (RelayStore::new(kv), clock)
    }

    #[test]
    fn test_put_take() {
        let (store, _) = store_with_clock();
        let token = Token::generate();

        store.put(&token, &Envelope::plain("hi"), 60).unwrap();
        assert_eq!(store.take_once(&token).unwrap(), Some(Envelope::plain("hi")));
        assert_eq!(store.take_once(&token).unwrap(), None);
    }

    #[test]
    fn test_last_write_wins() {
        let (store, _) = store_with_clock();
        let token = Token::generate();

        store.put(&token, &Envelope::plain("first"), 60).unwrap();
        store.put(&token, &Envelope::plain("second"), 60).unwrap();

        assert_eq!(
            store.take_once(&token).unwrap(),
            Some(Envelope::plain("second"))
        );
        assert_eq!(store.take_once(&token).unwrap(), None);
    }

    #[test]
    fn test_expired_is_empty() {
        let (store, clock) = store_with_clock();
        let token = Token::generate();

        store.put(&token, &Envelope::plain("late"), 1).unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.take_once(&token).unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_distinct_and_consumed() {
        let (store, _) = store_with_clock();
        let token = Token::generate();

        store.put_raw(&token, b"{not json".to_vec(), 60).unwrap();
        assert!(matches!(
            store.take_once(&token),
            Err(RelayError::CorruptRecord(_))
        ));
        assert_eq!(store.take_once(&token).unwrap(), None);

        store
            .put_raw(&token, br#"{"version":9,"encrypted":false,"text":"x"}"#.to_vec(), 60)
            .unwrap();
        assert!(matches!(
            store.take_once(&token),
            Err(RelayError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_tokens_are_isolated() {
        let (store, _) = store_with_clock();
        let a = Token::generate();
        let b = Token::generate();

        store.put(&a, &Envelope::plain("for a"), 60).unwrap();
        assert_eq!(store.take_once(&b).unwrap(), None);
        assert_eq!(store.take_once(&a).unwrap(), Some(Envelope::plain("for a")));
    }
}
