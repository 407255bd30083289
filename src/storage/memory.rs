//! In-memory key-value store
//!
//! Used by tests and by the CLI's `--ephemeral` mode. Reads and writes can be
//! made to fail on demand to exercise the transient I/O paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{validate_key, KeyValueStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    data: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get_item` fail until reset
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set_item`/`remove_item` fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes (sets and removes)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Peek at a raw value without going through the async API
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    /// Seed a raw value without counting it as a write
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.data.lock().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.data.lock().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.data.lock().remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_remove() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get_item("proStatus").await.unwrap(), None);

        store.set_item("proStatus", "true").await.unwrap();
        assert_eq!(
            store.get_item("proStatus").await.unwrap().as_deref(),
            Some("true")
        );

        store.remove_item("proStatus").await.unwrap();
        assert_eq!(store.get_item("proStatus").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_injected_failures() {
        let store = MemoryKeyValueStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.set_item("k", "v").await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.raw("k"), None);
        assert_eq!(store.write_count(), 0);

        store.set_fail_writes(false);
        store.set_fail_reads(true);
        store.set_item("k", "v").await.unwrap();
        assert!(store.get_item("k").await.is_err());
    }
}
