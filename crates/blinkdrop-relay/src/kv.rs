//! Backing key-value store capability
//!
//! The relay keeps no state of its own. Everything lives behind
//! [`KvStore`], which offers exactly the operations the protocol needs:
//! write with expiry, read, atomic get-and-delete, and delete.
//!
//! Expiry is owned by the store. Each value carries an absolute deadline
//! taken from the store's [`Clock`]; expired values are invisible to reads
//! whether or not [`KvStore::purge_expired`] has run yet.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Start at the given time
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Move forward
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Key-value store with per-key expiry
pub trait KvStore: Send + Sync {
    /// Unconditional write with expiry, replacing any existing value
    fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// Read a live value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read and delete a live value as one indivisible step.
    ///
    /// Under concurrent callers at most one observes the value.
    fn take(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key. Returns whether a live value was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Evict expired values. Returns how many were evicted.
    fn purge_expired(&self) -> Result<usize>;

    /// Backend name for diagnostics
    fn backend(&self) -> &'static str;
}

/// Value plus absolute deadline
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredValue {
    expires_at_ms: i64,
    data: Vec<u8>,
}

impl StoredValue {
    fn new(data: Vec<u8>, now_ms: i64, ttl_secs: u64) -> Result<Self> {
        if ttl_secs == 0 {
            return Err(RelayError::InvalidTtl);
        }
        let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        Ok(Self {
            expires_at_ms: now_ms.saturating_add(ttl_ms),
            data,
        })
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// In-process store
pub struct MemoryKvStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    /// Create an empty store on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let size = value.len();
        let stored = StoredValue::new(value, self.clock.now_millis(), ttl_secs)?;
        self.entries.insert(key.to_string(), stored);
        debug!("Stored {} bytes with ttl {}s", size, ttl_secs);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_millis();

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, value| value.is_expired(now));
        }
        Ok(None)
    }

    fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_millis();
        // remove() holds the shard lock across read and delete
        Ok(self
            .entries
            .remove(key)
            .map(|(_, value)| value)
            .filter(|value| !value.is_expired(now))
            .map(|value| value.data))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .remove(key)
            .map_or(false, |(_, value)| !value.is_expired(now)))
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        self.entries.retain(|_, value| {
            let keep = !value.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Sled-based persistent store
pub struct SledKvStore {
    db: sled::Db,
    clock: Arc<dyn Clock>,
}

impl SledKvStore {
    /// Open or create a store at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open or create a store at path on the given clock
    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db, clock })
    }

    fn decode(bytes: &[u8]) -> bincode::Result<StoredValue> {
        bincode::deserialize(bytes)
    }
}

impl KvStore for SledKvStore {
    fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let size = value.len();
        let stored = StoredValue::new(value, self.clock.now_millis(), ttl_secs)?;
        let framed = bincode::serialize(&stored)?;

        self.db.insert(key.as_bytes(), framed)?;
        self.db.flush()?;

        debug!("Stored {} bytes with ttl {}s", size, ttl_secs);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let raw = match self.db.get(key.as_bytes())? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let stored = Self::decode(&raw)?;
        if !stored.is_expired(self.clock.now_millis()) {
            return Ok(Some(stored.data));
        }

        // Only evict the exact bytes we saw; a concurrent set wins
        let _ = self
            .db
            .compare_and_swap(key.as_bytes(), Some(&raw), None::<&[u8]>)?;
        Ok(None)
    }

    fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // sled returns the previous value from the same atomic remove
        let raw = match self.db.remove(key.as_bytes())? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        // The remove already happened; a failed flush must not hide that
        if let Err(e) = self.db.flush() {
            warn!("Flush after take failed: {}", e);
        }

        let stored = Self::decode(&raw)
            .map_err(|e| RelayError::CorruptRecord(format!("undecodable frame: {}", e)))?;
        if stored.is_expired(self.clock.now_millis()) {
            return Ok(None);
        }
        Ok(Some(stored.data))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = match self.db.remove(key.as_bytes())? {
            // An undecodable frame still counts as removed
            Some(raw) => {
                Self::decode(&raw).map_or(true, |v| !v.is_expired(self.clock.now_millis()))
            }
            None => false,
        };
        self.db.flush()?;
        Ok(removed)
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0;

        for entry in self.db.iter() {
            let (key, raw) = entry?;
            // Undecodable frames are left for an operator to inspect
            let expired = Self::decode(&raw).map_or(false, |v| v.is_expired(now));
            if expired
                && self
                    .db
                    .compare_and_swap(&key, Some(&raw), None::<&[u8]>)?
                    .is_ok()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            self.db.flush()?;
        }
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "sled"
    }
}

/// Run the store's eviction pass on an interval
pub fn spawn_expiry_sweeper(
    store: Arc<dyn KvStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            match store.purge_expired() {
                Ok(count) if count > 0 => {
                    info!("Evicted {} expired records", count);
                }
                Err(e) => {
                    error!("Expiry sweep failed: {}", e);
                }
                _ => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(1_700_000_000_000))
    }

    fn exercise(store: &dyn KvStore, clock: &ManualClock) {
        store.set("a", b"one".to_vec(), 10).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"one".to_vec()));

        // Overwrite
        store.set("a", b"two".to_vec(), 10).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"two".to_vec()));

        // Take is destructive
        assert_eq!(store.take("a").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.take("a").unwrap(), None);
        assert_eq!(store.get("a").unwrap(), None);

        // Delete
        store.set("b", b"x".to_vec(), 10).unwrap();
        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());

        // Expiry
        store.set("c", b"y".to_vec(), 1).unwrap();
        clock.advance(Duration::from_millis(999));
        assert_eq!(store.get("c").unwrap(), Some(b"y".to_vec()));
        clock.advance(Duration::from_millis(1));
        assert_eq!(store.get("c").unwrap(), None);
        assert_eq!(store.take("c").unwrap(), None);

        assert!(matches!(
            store.set("d", b"z".to_vec(), 0),
            Err(RelayError::InvalidTtl)
        ));
    }

    #[test]
    fn test_memory_store() {
        let clock = clock();
        let store = MemoryKvStore::with_clock(clock.clone());
        exercise(&store, &clock);
        assert_eq!(store.backend(), "memory");
    }

    #[test]
    fn test_sled_store() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let store = SledKvStore::open_with_clock(dir.path(), clock.clone()).unwrap();
        exercise(&store, &clock);
        assert_eq!(store.backend(), "sled");
    }

    #[test]
    fn test_take_expired_removes_it() {
        let clock = clock();
        let store = MemoryKvStore::with_clock(clock.clone());

        store.set("k", b"v".to_vec(), 5).unwrap();
        clock.advance(Duration::from_secs(6));
        assert_eq!(store.take("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let dir = tempdir().unwrap();
        let clock = clock();
        let memory = MemoryKvStore::with_clock(clock.clone());
        let sled = SledKvStore::open_with_clock(dir.path(), clock.clone()).unwrap();

        for store in [&memory as &dyn KvStore, &sled as &dyn KvStore] {
            store.set("short-1", b"1".to_vec(), 1).unwrap();
            store.set("short-2", b"2".to_vec(), 1).unwrap();
            store.set("long", b"3".to_vec(), 3600).unwrap();
        }

        clock.advance(Duration::from_secs(2));

        assert_eq!(memory.purge_expired().unwrap(), 2);
        assert_eq!(sled.purge_expired().unwrap(), 2);
        assert_eq!(memory.len(), 1);
        assert_eq!(sled.get("long").unwrap(), Some(b"3".to_vec()));
        assert_eq!(memory.purge_expired().unwrap(), 0);
    }

    #[test]
    fn test_sled_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SledKvStore::open(dir.path()).unwrap();
            store.set("persist", b"data".to_vec(), 3600).unwrap();
        }
        let store = SledKvStore::open(dir.path()).unwrap();
        assert_eq!(store.take("persist").unwrap(), Some(b"data".to_vec()));
    }

    #[test]
    fn test_sled_take_garbage_frame_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();

        store.db.insert("msg:garbled", &b"\x01garbage"[..]).unwrap();
        assert!(matches!(
            store.take("msg:garbled"),
            Err(RelayError::CorruptRecord(_))
        ));
        // Consumed regardless
        assert_eq!(store.take("msg:garbled").unwrap(), None);

        store.db.insert("code:garbled", &b"\x01garbage"[..]).unwrap();
        assert!(store.delete("code:garbled").unwrap());
        assert_eq!(store.get("code:garbled").unwrap(), None);
    }

    #[test]
    fn test_concurrent_take_single_winner() {
        let dir = tempdir().unwrap();
        let stores: Vec<Arc<dyn KvStore>> = vec![
            Arc::new(MemoryKvStore::new()),
            Arc::new(SledKvStore::open(dir.path()).unwrap()),
        ];

        for store in stores {
            for round in 0..20 {
                let key = format!("race-{}", round);
                store.set(&key, b"prize".to_vec(), 60).unwrap();

                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let store = Arc::clone(&store);
                        let key = key.clone();
                        std::thread::spawn(move || store.take(&key).unwrap())
                    })
                    .collect();

                let winners = handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(Option::is_some)
                    .count();
                assert_eq!(winners, 1, "{} round {}", store.backend(), round);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts() {
        let clock = clock();
        let store = Arc::new(MemoryKvStore::with_clock(clock.clone()));
        store.set("gone", b"soon".to_vec(), 1).unwrap();
        clock.advance(Duration::from_secs(2));

        let handle = spawn_expiry_sweeper(store.clone(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(store.is_empty());
        handle.abort();
    }
}
