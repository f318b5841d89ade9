//! # Blinkdrop Relay
//!
//! One-shot message relay. A sender deposits a single envelope under a
//! session token; exactly one receiver may collect it, after which it is
//! gone.
//!
//! ## Features
//!
//! - **Exactly-once delivery**: retrieval is an atomic get-and-delete in
//!   the backing store
//! - **Hard expiry**: records and aliases carry store-enforced TTLs
//! - **Short code aliases**: typeable codes resolve to tokens and are
//!   spent on delivery
//! - **Opaque encryption**: encrypted envelopes are shape-checked only

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod kv;
pub mod registry;
pub mod service;
pub mod store;

pub use config::{RelayConfig, StorageBackend, StorageConfig};
pub use error::{RelayError, Result};
pub use kv::{Clock, KvStore, ManualClock, MemoryKvStore, SledKvStore, SystemClock};
pub use registry::{Resolved, SessionGrant, SessionRegistry};
pub use service::{RelayService, SendReceipt};
pub use store::RelayStore;

/// Default message lifetime in seconds (30 minutes)
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 1800;

/// Default short code lifetime in seconds (30 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;
