//! Time-limited unlocks
//!
//! A lockable catalog item becomes readable for a fixed window after the user
//! earns a reward. The relation is a single table `item_id -> unlocked_until`
//! (epoch milliseconds), persisted wholesale under one storage key.
//!
//! ## Module Structure
//!
//! - `store`: whole-table load/save against a [`KeyValueStore`]
//! - `manager`: the lock/unlock protocol, lazy expiry and sweeping
//! - `remaining`: remaining-time computation and display labels
//! - `sweeper`: periodic background cleanup of expired records
//!
//! [`KeyValueStore`]: crate::storage::KeyValueStore

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::StoreError;

pub mod manager;
pub mod remaining;
pub mod store;
pub mod sweeper;

pub use manager::{SweepReport, UnlockManager, UnlockSnapshot};
pub use remaining::{RemainingStyle, RemainingTime};
pub use store::UnlockStore;
pub use sweeper::spawn_sweeper;

/// How long one reward keeps an item unlocked
pub const UNLOCK_DURATION: Duration = Duration::from_secs(12 * 60 * 60);

/// How often expired records are swept while the app is active
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Storage key holding the whole unlock table
pub const UNLOCK_TABLE_KEY: &str = "unlockedVegetables";

/// Current on-disk layout of the unlock table
pub const UNLOCK_TABLE_VERSION: u32 = 1;

/// A single unlock grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRecord {
    pub item_id: String,
    /// Absolute expiry instant in epoch milliseconds
    pub unlocked_until: u64,
}

impl UnlockRecord {
    pub fn new(item_id: impl Into<String>, unlocked_until: u64) -> Self {
        Self {
            item_id: item_id.into(),
            unlocked_until,
        }
    }

    /// A record is live strictly before its expiry instant
    pub fn is_active(&self, now: u64) -> bool {
        self.unlocked_until > now
    }
}

/// Stored value for one table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockEntry {
    pub unlocked_until: u64,
}

/// Mapping from item id to its unlock expiry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockTable {
    entries: BTreeMap<String, UnlockEntry>,
}

impl UnlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: BTreeMap<String, UnlockEntry>) -> Self {
        Self { entries }
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, UnlockEntry> {
        &self.entries
    }

    /// Raw record lookup, regardless of expiry
    pub fn get(&self, item_id: &str) -> Option<UnlockRecord> {
        self.entries
            .get(item_id)
            .map(|e| UnlockRecord::new(item_id, e.unlocked_until))
    }

    /// Record lookup that treats expired records as absent
    pub fn active(&self, item_id: &str, now: u64) -> Option<UnlockRecord> {
        self.get(item_id).filter(|r| r.is_active(now))
    }

    /// Insert or overwrite the record for `record.item_id`
    pub fn insert(&mut self, record: UnlockRecord) -> Option<UnlockRecord> {
        let previous = self.entries.insert(
            record.item_id.clone(),
            UnlockEntry {
                unlocked_until: record.unlocked_until,
            },
        );
        previous.map(|e| UnlockRecord::new(record.item_id, e.unlocked_until))
    }

    pub fn remove(&mut self, item_id: &str) -> Option<UnlockRecord> {
        self.entries
            .remove(item_id)
            .map(|e| UnlockRecord::new(item_id, e.unlocked_until))
    }

    /// Drop every record with `unlocked_until <= now`, returning their ids
    pub fn remove_expired(&mut self, now: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.unlocked_until <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }

    pub fn records(&self) -> impl Iterator<Item = UnlockRecord> + '_ {
        self.entries
            .iter()
            .map(|(id, e)| UnlockRecord::new(id.clone(), e.unlocked_until))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Errors from unlock persistence
#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_duration_is_twelve_hours() {
        assert_eq!(UNLOCK_DURATION.as_millis(), 43_200_000);
        assert_eq!(SWEEP_INTERVAL.as_secs(), 300);
    }

    #[test]
    fn test_record_expiry_boundary() {
        let record = UnlockRecord::new("だいこん", 1_000);
        assert!(record.is_active(999));
        assert!(!record.is_active(1_000));
        assert!(!record.is_active(1_001));
    }

    #[test]
    fn test_table_insert_overwrites() {
        let mut table = UnlockTable::new();
        assert!(table.insert(UnlockRecord::new("トマト", 100)).is_none());

        let previous = table.insert(UnlockRecord::new("トマト", 50));
        assert_eq!(previous, Some(UnlockRecord::new("トマト", 100)));
        assert_eq!(table.get("トマト").unwrap().unlocked_until, 50);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_active_hides_expired() {
        let mut table = UnlockTable::new();
        table.insert(UnlockRecord::new("ねぎ", 100));

        assert!(table.active("ねぎ", 99).is_some());
        assert!(table.active("ねぎ", 100).is_none());
        // still physically present until removed
        assert!(table.get("ねぎ").is_some());
    }

    #[test]
    fn test_remove_expired() {
        let mut table = UnlockTable::new();
        table.insert(UnlockRecord::new("いちご", 100));
        table.insert(UnlockRecord::new("みかん", 200));
        table.insert(UnlockRecord::new("りんご", 300));

        let removed = table.remove_expired(200);
        assert_eq!(removed, vec!["いちご".to_string(), "みかん".to_string()]);
        assert_eq!(table.len(), 1);
        assert!(table.get("りんご").is_some());

        assert!(table.remove_expired(200).is_empty());
    }
}
