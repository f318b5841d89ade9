//! Relay configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::kv::{KvStore, MemoryKvStore, SledKvStore};

/// Relay configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Lifetime of a pending message in seconds
    pub message_ttl_secs: u64,
    /// Lifetime of a short code alias in seconds
    pub session_ttl_secs: u64,
    /// Interval of the backing store's eviction sweep in seconds
    pub sweep_interval_secs: u64,
    /// Backing store
    pub storage: StorageConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            message_ttl_secs: crate::DEFAULT_MESSAGE_TTL_SECS,
            session_ttl_secs: crate::DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: 60,
            storage: StorageConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.message_ttl_secs == 0 {
            return Err(RelayError::Config("message_ttl_secs must be > 0".to_string()));
        }
        if self.session_ttl_secs == 0 {
            return Err(RelayError::Config("session_ttl_secs must be > 0".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(RelayError::Config("sweep_interval_secs must be > 0".to_string()));
        }
        if self.storage.backend == StorageBackend::Sled && self.storage.path.as_os_str().is_empty()
        {
            return Err(RelayError::Config("sled backend needs a storage path".to_string()));
        }
        Ok(())
    }
}

/// Backing store selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process map, lost on restart
    Memory,
    /// Sled database on disk
    Sled,
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to use
    pub backend: StorageBackend,
    /// Database path for the sled backend
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("./data/blinkdrop"),
        }
    }
}

impl StorageConfig {
    /// Open the configured backend
    pub fn open(&self) -> Result<Arc<dyn KvStore>> {
        match self.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryKvStore::new())),
            StorageBackend::Sled => Ok(Arc::new(SledKvStore::open(&self.path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.message_ttl_secs, 1800);
        assert_eq!(config.session_ttl_secs, 1800);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = RelayConfig {
            message_ttl_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));

        let config = RelayConfig {
            session_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sled_needs_path() {
        let config = RelayConfig {
            storage: StorageConfig {
                backend: StorageBackend::Sled,
                path: PathBuf::new(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: RelayConfig = serde_json::from_str(
            r#"{
                "message_ttl_secs": 300,
                "session_ttl_secs": 900,
                "sweep_interval_secs": 15,
                "storage": {"backend": "sled", "path": "/var/lib/blinkdrop"}
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.sweep_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_open_sled_backend() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            backend: StorageBackend::Sled,
            path: dir.path().join("db"),
        };
        let kv = storage.open().unwrap();
        assert_eq!(kv.backend(), "sled");
    }
}
