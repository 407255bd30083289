//! Whole-table persistence for unlock records
//!
//! The table is read and written as one JSON blob under a single key:
//!
//! ```json
//! {"version": 1, "entries": {"だいこん": {"unlockedUntil": 1700000000000}}}
//! ```
//!
//! Unversioned blobs (a bare `{"<item>": {"unlockedUntil": ..}}` object, as
//! written by earlier app releases) are still accepted and are rewritten in
//! the versioned layout on the next save. A blob that fails to parse is
//! treated as an empty table and heals on the next successful save.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{UnlockEntry, UnlockError, UnlockTable, UNLOCK_TABLE_KEY, UNLOCK_TABLE_VERSION};
use crate::storage::KeyValueStore;

/// Serializable format for unlock table persistence
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnlockTableData {
    /// Version for migration support
    version: u32,
    entries: BTreeMap<String, UnlockEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Versioned(UnlockTableData),
    Legacy(BTreeMap<String, UnlockEntry>),
}

pub(crate) fn decode_table(blob: &str) -> Result<UnlockTable, serde_json::Error> {
    match serde_json::from_str::<StoredBlob>(blob)? {
        StoredBlob::Versioned(data) => {
            if data.version > UNLOCK_TABLE_VERSION {
                tracing::warn!(
                    "Unlock table version {} is newer than supported version {}",
                    data.version,
                    UNLOCK_TABLE_VERSION
                );
            }
            Ok(UnlockTable::from_entries(data.entries))
        }
        StoredBlob::Legacy(entries) => {
            tracing::debug!(count = entries.len(), "Read unversioned unlock table");
            Ok(UnlockTable::from_entries(entries))
        }
    }
}

pub(crate) fn encode_table(table: &UnlockTable) -> Result<String, serde_json::Error> {
    serde_json::to_string(&UnlockTableData {
        version: UNLOCK_TABLE_VERSION,
        entries: table.entries().clone(),
    })
}

/// Reads and writes the unlock table wholesale
#[derive(Clone)]
pub struct UnlockStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for UnlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockStore").field("key", &self.key).finish()
    }
}

impl UnlockStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: UNLOCK_TABLE_KEY.to_string(),
        }
    }

    /// Load the table for reading.
    ///
    /// Never fails: a missing blob, a read error and a malformed blob all
    /// yield an empty table.
    pub async fn load(&self) -> UnlockTable {
        match self.load_for_update().await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(key = %self.key, "Failed to read unlock table: {}", e);
                UnlockTable::new()
            }
        }
    }

    /// Load the table as the base of a read-modify-write.
    ///
    /// Malformed blobs still yield an empty table, but a storage read error
    /// is returned so the caller does not overwrite entries it never saw.
    pub async fn load_for_update(&self) -> Result<UnlockTable, UnlockError> {
        let Some(blob) = self.kv.get_item(&self.key).await? else {
            return Ok(UnlockTable::new());
        };

        match decode_table(&blob) {
            Ok(table) => Ok(table),
            Err(e) => {
                tracing::warn!(key = %self.key, "Discarding malformed unlock table: {}", e);
                Ok(UnlockTable::new())
            }
        }
    }

    /// Serialize and overwrite the whole table
    pub async fn save(&self, table: &UnlockTable) -> Result<(), UnlockError> {
        let blob = encode_table(table)?;
        if let Err(e) = self.kv.set_item(&self.key, &blob).await {
            tracing::warn!(key = %self.key, "Failed to save unlock table: {}", e);
            return Err(e.into());
        }
        tracing::debug!(key = %self.key, entries = table.len(), "Unlock table saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyValueStore;
    use crate::unlock::UnlockRecord;

    fn store_with(kv: &Arc<MemoryKeyValueStore>) -> UnlockStore {
        UnlockStore::new(kv.clone())
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        assert!(store_with(&kv).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = store_with(&kv);

        let mut table = UnlockTable::new();
        table.insert(UnlockRecord::new("キャベツ", 1_700_000_000_000));
        store.save(&table).await.unwrap();

        let raw = kv.raw(UNLOCK_TABLE_KEY).unwrap();
        assert!(raw.contains("\"version\":1"));
        assert!(raw.contains("\"unlockedUntil\":1700000000000"));

        assert_eq!(store.load().await, table);
    }

    #[tokio::test]
    async fn test_legacy_blob_is_read() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.insert_raw(
            UNLOCK_TABLE_KEY,
            r#"{"だいこん":{"unlockedUntil":5000},"レタス":{"unlockedUntil":9000}}"#,
        );

        let table = store_with(&kv).load().await;
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("レタス").unwrap().unlocked_until, 9000);
    }

    #[tokio::test]
    async fn test_legacy_blob_is_upgraded_on_save() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.insert_raw(UNLOCK_TABLE_KEY, r#"{"ねぎ":{"unlockedUntil":5000}}"#);
        let store = store_with(&kv);

        let table = store.load().await;
        store.save(&table).await.unwrap();

        let raw = kv.raw(UNLOCK_TABLE_KEY).unwrap();
        assert!(raw.starts_with("{\"version\":1"));
        assert_eq!(store.load().await.get("ねぎ").unwrap().unlocked_until, 5000);
    }

    #[tokio::test]
    async fn test_malformed_blob_is_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.insert_raw(UNLOCK_TABLE_KEY, "{not json");
        let store = store_with(&kv);

        assert!(store.load().await.is_empty());
        assert!(store.load_for_update().await.unwrap().is_empty());

        kv.insert_raw(UNLOCK_TABLE_KEY, r#"{"ねぎ":{"until":5}}"#);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_only_fails_updates() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = store_with(&kv);
        let mut table = UnlockTable::new();
        table.insert(UnlockRecord::new("トマト", 10));
        store.save(&table).await.unwrap();

        kv.set_fail_reads(true);
        assert!(store.load().await.is_empty());
        assert!(matches!(
            store.load_for_update().await,
            Err(UnlockError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set_fail_writes(true);
        let result = store_with(&kv).save(&UnlockTable::new()).await;
        assert!(matches!(result, Err(UnlockError::Store(_))));
    }
}
