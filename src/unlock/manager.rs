//! Unlock lifecycle: grant, lazy expiry and sweep
//!
//! Per item the state is either `Locked` (no record, or an expired one) or
//! `Unlocked` (`unlocked_until > now`). There is no persisted pending state.
//!
//! All mutations are read-modify-write of the whole table and are serialized
//! through one async write lock, so a sweep and a grant racing on slow I/O
//! cannot drop each other's entries. Across processes the last save wins.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use super::remaining::RemainingTime;
use crate::clock::duration_ms;
use super::{UnlockError, UnlockRecord, UnlockStore, UNLOCK_DURATION};

/// Result of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Ids whose records were removed
    pub removed: Vec<String>,
    /// Records still live after the sweep
    pub remaining: usize,
    /// Whether the table was written back
    pub saved: bool,
}

/// Read-only view of the live unlock records at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockSnapshot {
    now: u64,
    live: HashMap<String, u64>,
}

impl UnlockSnapshot {
    pub fn new(now: u64, records: impl IntoIterator<Item = UnlockRecord>) -> Self {
        let live = records
            .into_iter()
            .filter(|r| r.is_active(now))
            .map(|r| (r.item_id, r.unlocked_until))
            .collect();
        Self { now, live }
    }

    /// Snapshot with nothing unlocked
    pub fn empty(now: u64) -> Self {
        Self {
            now,
            live: HashMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_unlocked(&self, item_id: &str) -> bool {
        self.live.contains_key(item_id)
    }

    pub fn record(&self, item_id: &str) -> Option<UnlockRecord> {
        self.live
            .get(item_id)
            .map(|until| UnlockRecord::new(item_id, *until))
    }

    pub fn remaining(&self, item_id: &str) -> Option<RemainingTime> {
        self.record(item_id)
            .and_then(|r| RemainingTime::for_record(&r, self.now))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Owns the unlock table and its lifecycle
#[derive(Debug)]
pub struct UnlockManager {
    store: UnlockStore,
    write_lock: Mutex<()>,
    duration: Duration,
}

impl UnlockManager {
    pub fn new(store: UnlockStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            duration: UNLOCK_DURATION,
        }
    }

    /// Override the unlock window used by [`UnlockManager::grant_default`]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn unlock_duration(&self) -> Duration {
        self.duration
    }

    pub fn store(&self) -> &UnlockStore {
        &self.store
    }

    /// Whether `item_id` is unlocked at `now`.
    ///
    /// An expired record is deleted as a side effect before reporting
    /// `false`; once deleted, later calls find nothing and return `false`
    /// without writing.
    pub async fn is_unlocked(&self, item_id: &str, now: u64) -> bool {
        self.active_record(item_id, now).await.is_some()
    }

    /// The live record for `item_id`, applying the same lazy expiry as
    /// [`UnlockManager::is_unlocked`]
    pub async fn active_record(&self, item_id: &str, now: u64) -> Option<UnlockRecord> {
        let record = self.store.load().await.get(item_id)?;
        if record.is_active(now) {
            return Some(record);
        }

        if let Err(e) = self.expire(item_id, now).await {
            tracing::warn!(item_id = %item_id, "Lazy expiry failed: {}", e);
        }
        None
    }

    /// Remaining unlock time, `None` when locked or exactly at expiry
    pub async fn remaining_time(&self, item_id: &str, now: u64) -> Option<RemainingTime> {
        self.active_record(item_id, now)
            .await
            .and_then(|r| RemainingTime::for_record(&r, now))
    }

    async fn expire(&self, item_id: &str, now: u64) -> Result<(), UnlockError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.store.load_for_update().await?;

        // A grant may have landed between the read and taking the lock
        match table.get(item_id) {
            Some(record) if !record.is_active(now) => {
                table.remove(item_id);
                self.store.save(&table).await?;
                tracing::debug!(item_id = %item_id, "Expired unlock removed on read");
            }
            _ => {}
        }
        Ok(())
    }

    /// Unlock `item_id` until `now + duration`.
    ///
    /// Overwrites any existing record: re-granting restarts the window from
    /// `now`, it never adds to the time left.
    pub async fn grant(
        &self,
        item_id: &str,
        now: u64,
        duration: Duration,
    ) -> Result<UnlockRecord, UnlockError> {
        let record = UnlockRecord::new(item_id, now.saturating_add(duration_ms(duration)));

        let _guard = self.write_lock.lock().await;
        let mut table = self.store.load_for_update().await?;
        table.insert(record.clone());
        self.store.save(&table).await?;

        tracing::info!(
            item_id = %item_id,
            unlocked_until = record.unlocked_until,
            "Unlock granted"
        );
        Ok(record)
    }

    /// [`UnlockManager::grant`] with the configured unlock window
    pub async fn grant_default(
        &self,
        item_id: &str,
        now: u64,
    ) -> Result<UnlockRecord, UnlockError> {
        self.grant(item_id, now, self.duration).await
    }

    /// Remove every record with `unlocked_until <= now`.
    ///
    /// Writes back only when something was removed.
    pub async fn sweep(&self, now: u64) -> Result<SweepReport, UnlockError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.store.load_for_update().await?;
        let removed = table.remove_expired(now);

        let saved = if removed.is_empty() {
            false
        } else {
            self.store.save(&table).await?;
            tracing::info!(removed = removed.len(), "Swept expired unlocks");
            true
        };

        Ok(SweepReport {
            removed,
            remaining: table.len(),
            saved,
        })
    }

    /// Read-only view of live records; never deletes
    pub async fn snapshot(&self, now: u64) -> UnlockSnapshot {
        UnlockSnapshot::new(now, self.store.load().await.records())
    }
}
