//! Relay service: session creation, send and receive
//!
//! Per token the service sees `Empty -> Pending -> Delivered | Expired`.
//! It holds no mutable state of its own; every operation is a bounded
//! sequence of backing store calls, and the only synchronization point is
//! the store's atomic take.

use std::sync::Arc;

use blinkdrop_core::Envelope;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::kv::KvStore;
use crate::registry::{SessionGrant, SessionRegistry};
use crate::store::RelayStore;

/// Result of a successful send
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// TTL applied to the stored message
    pub expires_in_seconds: u64,
}

/// Protocol surface over the registry and relay store
pub struct RelayService {
    registry: SessionRegistry,
    store: RelayStore,
    message_ttl_secs: u64,
    backend: &'static str,
}

impl RelayService {
    /// Create over a backing store
    pub fn new(kv: Arc<dyn KvStore>, config: &RelayConfig) -> Self {
        Self {
            registry: SessionRegistry::new(Arc::clone(&kv), config.session_ttl_secs),
            store: RelayStore::new(Arc::clone(&kv)),
            message_ttl_secs: config.message_ttl_secs,
            backend: kv.backend(),
        }
    }

    /// Backing store name
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Issue a new token and short code
    #[instrument(skip_all)]
    pub async fn create_session(&self) -> Result<SessionGrant> {
        self.registry.create_session()
    }

    /// Deposit an envelope for the session behind `identifier`.
    ///
    /// The identifier is resolved before the envelope is validated; an
    /// invalid envelope never reaches storage.
    #[instrument(skip_all)]
    pub async fn send(&self, identifier: &str, raw: &Value) -> Result<SendReceipt> {
        let resolved = self.registry.resolve(identifier)?;
        let envelope = Envelope::validate(raw)?;

        self.store
            .put(&resolved.token, &envelope, self.message_ttl_secs)?;

        info!(
            "Accepted {} envelope for {}",
            if envelope.is_encrypted() { "encrypted" } else { "plain" },
            resolved.token.redacted()
        );

        Ok(SendReceipt {
            expires_in_seconds: self.message_ttl_secs,
        })
    }

    /// Collect the pending envelope, if any.
    ///
    /// An unresolvable identifier reads as "no message yet" so pollers
    /// cannot probe which identifiers exist. A consumed short code is
    /// invalidated immediately.
    #[instrument(skip_all)]
    pub async fn receive(&self, identifier: &str) -> Result<Option<Envelope>> {
        let resolved = match self.registry.resolve(identifier) {
            Ok(resolved) => resolved,
            Err(RelayError::UnknownIdentifier) => return Ok(None),
            Err(e) => return Err(e),
        };

        let taken = self.store.take_once(&resolved.token);

        let consumed = matches!(taken, Ok(Some(_)) | Err(RelayError::CorruptRecord(_)));
        if let (true, Some(code)) = (consumed, resolved.alias.as_ref()) {
            // The record is already gone; a stale alias just lapses at its TTL
            if let Err(e) = self.registry.invalidate(code) {
                warn!("Failed to invalidate code {}: {}", code.redacted(), e);
            }
        }

        if let Ok(Some(_)) = &taken {
            info!("Delivered envelope for {}", resolved.token.redacted());
        } else if let Ok(None) = &taken {
            debug!("Nothing pending for {}", resolved.token.redacted());
        }

        taken
    }
}
