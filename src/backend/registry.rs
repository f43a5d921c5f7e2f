//! Connection Registry
//!
//! Process-wide cache of backend handles keyed by the full connection
//! configuration. Two endpoints with identical driver, url, table and
//! parameters share one handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{BackendConfig, ConnectionHandle};
use crate::query::{QueryError, QueryResult};

/// One cache entry; `None` until an open succeeds
type Slot = Arc<Mutex<Option<ConnectionHandle>>>;

/// Cache of open connections: cache key → handle
#[derive(Default)]
pub struct ConnectionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for `config`, opening it on first use
    ///
    /// Opening holds only the lock for this key: concurrent first requests
    /// for the same configuration construct exactly one handle, while other
    /// keys are served meanwhile. A failed open is not cached.
    pub fn get_connection(&self, config: &BackendConfig) -> QueryResult<ConnectionHandle> {
        let key = config.cache_key()?;
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|e| QueryError::Lock(e.to_string()))?;
            Arc::clone(slots.entry(key).or_default())
        };

        let mut entry = slot.lock().map_err(|e| QueryError::Lock(e.to_string()))?;
        if let Some(handle) = entry.as_ref() {
            tracing::debug!(
                driver = %config.driver,
                url = %config.url,
                "Reusing cached connection"
            );
            return Ok(handle.clone());
        }

        let handle = ConnectionHandle::open(config)?;
        tracing::info!(
            driver = %config.driver,
            url = %config.url,
            table = %config.table,
            "Opened backend connection"
        );
        *entry = Some(handle.clone());
        Ok(handle)
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        let Ok(slots) = self.slots.lock() else {
            return 0;
        };
        slots
            .values()
            .filter(|slot| slot.lock().map(|h| h.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn slot(&self, config: &BackendConfig) -> Slot {
        let key = config.cache_key().unwrap();
        Arc::clone(self.slots.lock().unwrap().entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DriverKind;
    use std::sync::mpsc;
    use std::time::Duration;

    fn csv_config(dir: &tempfile::TempDir, table: &str) -> BackendConfig {
        std::fs::write(dir.path().join("flags.csv"), "id,country\n1,US\n").unwrap();
        std::fs::write(dir.path().join("cities.csv"), "name\nParis\n").unwrap();
        BackendConfig::new(DriverKind::Array, dir.path().to_str().unwrap(), table)
    }

    #[test]
    fn test_same_config_shares_handle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();

        let a = registry.get_connection(&csv_config(&dir, "flags")).unwrap();
        let b = registry.get_connection(&csv_config(&dir, "flags")).unwrap();

        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_table_is_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();

        let a = registry.get_connection(&csv_config(&dir, "flags")).unwrap();
        let b = registry.get_connection(&csv_config(&dir, "cities")).unwrap();

        assert!(!a.ptr_eq(&b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_relational_handles_shared() {
        let registry = ConnectionRegistry::new();
        let config = BackendConfig::new(DriverKind::Relational, "sqlite://", "flags");

        let a = registry.get_connection(&config).unwrap();
        let b = registry.get_connection(&config).unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_failed_open_not_cached() {
        let registry = ConnectionRegistry::new();
        let config = BackendConfig::new(DriverKind::Array, "/no/such/file.csv", "");

        assert!(registry.get_connection(&config).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_first_use_opens_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = csv_config(&dir, "flags");
        let registry = Arc::new(ConnectionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let config = config.clone();
                std::thread::spawn(move || registry.get_connection(&config).unwrap())
            })
            .collect();
        let opened: Vec<ConnectionHandle> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(opened.windows(2).all(|w| w[0].ptr_eq(&w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_open_does_not_block_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let busy = csv_config(&dir, "flags");

        // Hold the flags slot as an in-progress open would
        let slot = registry.slot(&busy);
        let guard = slot.lock().unwrap();

        let (tx, rx) = mpsc::channel();
        let other = csv_config(&dir, "cities");
        let worker = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                tx.send(registry.get_connection(&other).is_ok()).unwrap();
            })
        };

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        drop(guard);
        worker.join().unwrap();

        assert!(registry.get_connection(&busy).is_ok());
        assert_eq!(registry.len(), 2);
    }
}
