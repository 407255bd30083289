//! Subscription entitlement
//!
//! One process-wide boolean. When set, every per-item lock is bypassed. The
//! flag is cached durably under [`ENTITLEMENT_KEY`] so the app starts with the
//! last known state, then refreshed from an [`EntitlementSource`] at startup,
//! on a coarse poll, and on explicit purchase/restore confirmation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::periodic::PeriodicTask;
use crate::storage::{KeyValueStore, StoreError};

/// Storage key for the cached entitlement flag
pub const ENTITLEMENT_KEY: &str = "proStatus";

/// How often the entitlement source is polled
pub const ENTITLEMENT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Entitlement source unavailable: {0}")]
    Unavailable(String),
}

/// Cheaply clonable handle to the process-wide entitlement flag
#[derive(Debug, Clone, Default)]
pub struct EntitlementFlag(Arc<AtomicBool>);

impl EntitlementFlag {
    pub fn new(active: bool) -> Self {
        Self(Arc::new(AtomicBool::new(active)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag, returning the previous value
    pub fn set(&self, active: bool) -> bool {
        self.0.swap(active, Ordering::SeqCst)
    }
}

/// Where the entitlement state was last taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntitlementOrigin {
    Default,
    Cache,
    Source,
    Confirmation,
}

/// Subscription status reported by the payment collaborator
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn is_active(&self) -> Result<bool, EntitlementError>;
}

/// Reads and writes the cached flag in the key-value store.
///
/// Also usable as an [`EntitlementSource`] when there is no payment backend,
/// in which case the cache is the source of truth.
#[derive(Clone)]
pub struct StoredEntitlementSource {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StoredEntitlementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredEntitlementSource")
            .field("key", &ENTITLEMENT_KEY)
            .finish()
    }
}

impl StoredEntitlementSource {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The cached flag, `None` when never written or unreadable as a bool
    pub async fn load(&self) -> Result<Option<bool>, StoreError> {
        let raw = self.kv.get_item(ENTITLEMENT_KEY).await?;
        Ok(raw.and_then(|value| {
            let parsed = parse_flag(&value);
            if parsed.is_none() {
                tracing::warn!(value = %value, "Ignoring malformed cached entitlement");
            }
            parsed
        }))
    }

    pub async fn save(&self, active: bool) -> Result<(), StoreError> {
        self.kv
            .set_item(ENTITLEMENT_KEY, if active { "true" } else { "false" })
            .await
    }
}

#[async_trait]
impl EntitlementSource for StoredEntitlementSource {
    async fn is_active(&self) -> Result<bool, EntitlementError> {
        Ok(self.load().await?.unwrap_or(false))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Owns the entitlement flag and keeps it in sync with cache and source
pub struct Entitlements {
    flag: EntitlementFlag,
    cache: StoredEntitlementSource,
    source: Arc<dyn EntitlementSource>,
    origin: parking_lot::Mutex<EntitlementOrigin>,
}

impl std::fmt::Debug for Entitlements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entitlements")
            .field("active", &self.flag.is_active())
            .field("origin", &*self.origin.lock())
            .finish()
    }
}

impl Entitlements {
    pub fn new(kv: Arc<dyn KeyValueStore>, source: Arc<dyn EntitlementSource>) -> Self {
        Self {
            flag: EntitlementFlag::default(),
            cache: StoredEntitlementSource::new(kv),
            source,
            origin: parking_lot::Mutex::new(EntitlementOrigin::Default),
        }
    }

    pub fn flag(&self) -> EntitlementFlag {
        self.flag.clone()
    }

    pub fn is_entitled(&self) -> bool {
        self.flag.is_active()
    }

    pub fn origin(&self) -> EntitlementOrigin {
        *self.origin.lock()
    }

    /// Initialize the flag from the durable cache. Read failures leave the
    /// flag inactive.
    pub async fn load_cached(&self) -> bool {
        match self.cache.load().await {
            Ok(Some(active)) => {
                self.flag.set(active);
                *self.origin.lock() = EntitlementOrigin::Cache;
                tracing::debug!(active, "Loaded cached entitlement");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read cached entitlement: {}", e),
        }
        self.flag.is_active()
    }

    /// Ask the source for the current status and apply it.
    ///
    /// On source failure the current flag is kept.
    pub async fn refresh(&self) -> bool {
        match self.source.is_active().await {
            Ok(active) => {
                self.apply(active, EntitlementOrigin::Source).await;
            }
            Err(e) => tracing::warn!("Entitlement refresh failed: {}", e),
        }
        self.flag.is_active()
    }

    /// Record a successful purchase or restore
    pub async fn confirm(&self, active: bool) -> Result<(), EntitlementError> {
        self.flag.set(active);
        *self.origin.lock() = EntitlementOrigin::Confirmation;
        tracing::info!(active, "Entitlement confirmed");
        self.cache.save(active).await?;
        Ok(())
    }

    async fn apply(&self, active: bool, origin: EntitlementOrigin) {
        let previous = self.flag.set(active);
        *self.origin.lock() = origin;
        if previous == active {
            return;
        }

        tracing::info!(active, "Entitlement changed");
        if let Err(e) = self.cache.save(active).await {
            tracing::warn!("Failed to cache entitlement: {}", e);
        }
    }
}

/// Refresh `entitlements` every `interval` until the handle is dropped
pub fn spawn_entitlement_poller(
    entitlements: Arc<Entitlements>,
    interval: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn("entitlement-poll", interval, move || {
        let entitlements = entitlements.clone();
        async move {
            entitlements.refresh().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyValueStore;

    struct FakeSource {
        active: AtomicBool,
        fail: AtomicBool,
    }

    impl FakeSource {
        fn new(active: bool) -> Arc<Self> {
            Arc::new(Self {
                active: AtomicBool::new(active),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl EntitlementSource for FakeSource {
        async fn is_active(&self) -> Result<bool, EntitlementError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EntitlementError::Unavailable("offline".into()));
            }
            Ok(self.active.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_flag_is_shared() {
        let flag = EntitlementFlag::default();
        let other = flag.clone();
        assert!(!flag.set(true));
        assert!(other.is_active());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" false\n"), Some(false));
        assert_eq!(parse_flag("yes"), None);
    }

    #[tokio::test]
    async fn test_load_cached() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.insert_raw(ENTITLEMENT_KEY, "true");

        let entitlements = Entitlements::new(kv.clone(), FakeSource::new(false));
        assert!(entitlements.load_cached().await);
        assert_eq!(entitlements.origin(), EntitlementOrigin::Cache);
    }

    #[tokio::test]
    async fn test_load_cached_tolerates_errors() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.insert_raw(ENTITLEMENT_KEY, "garbage");
        let entitlements = Entitlements::new(kv.clone(), FakeSource::new(false));
        assert!(!entitlements.load_cached().await);

        kv.set_fail_reads(true);
        assert!(!entitlements.load_cached().await);
    }

    #[tokio::test]
    async fn test_refresh_writes_cache_on_change_only() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let source = FakeSource::new(true);
        let entitlements = Entitlements::new(kv.clone(), source.clone());

        assert!(entitlements.refresh().await);
        assert_eq!(kv.raw(ENTITLEMENT_KEY).as_deref(), Some("true"));
        let writes = kv.write_count();

        assert!(entitlements.refresh().await);
        assert_eq!(kv.write_count(), writes);

        source.active.store(false, Ordering::SeqCst);
        assert!(!entitlements.refresh().await);
        assert_eq!(kv.raw(ENTITLEMENT_KEY).as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_flag() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let source = FakeSource::new(true);
        let entitlements = Entitlements::new(kv, source.clone());
        entitlements.refresh().await;

        source.fail.store(true, Ordering::SeqCst);
        assert!(entitlements.refresh().await);
    }

    #[tokio::test]
    async fn test_confirm_persists() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let entitlements = Entitlements::new(kv.clone(), FakeSource::new(false));

        entitlements.confirm(true).await.unwrap();
        assert!(entitlements.is_entitled());
        assert_eq!(entitlements.origin(), EntitlementOrigin::Confirmation);

        let stored = StoredEntitlementSource::new(kv);
        assert_eq!(stored.load().await.unwrap(), Some(true));
        assert!(stored.is_active().await.unwrap());
    }

    #[tokio::test]
    async fn test_confirm_write_failure_still_sets_flag() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set_fail_writes(true);
        let entitlements = Entitlements::new(kv, FakeSource::new(false));

        assert!(entitlements.confirm(true).await.is_err());
        assert!(entitlements.is_entitled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_picks_up_changes() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let source = FakeSource::new(false);
        let entitlements = Arc::new(Entitlements::new(kv, source.clone()));

        let poller = spawn_entitlement_poller(entitlements.clone(), ENTITLEMENT_POLL_INTERVAL);
        source.active.store(true, Ordering::SeqCst);
        assert!(!entitlements.is_entitled());

        tokio::time::sleep(ENTITLEMENT_POLL_INTERVAL + Duration::from_secs(1)).await;
        assert!(entitlements.is_entitled());

        poller.shutdown().await;
    }
}
