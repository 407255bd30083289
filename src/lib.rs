//! yasai-gate - Ad-gated unlocks for a vegetable price catalog
//!
//! Some catalog items stay locked until the user either holds a subscription
//! or watches a rewarded ad, which unlocks that one item for twelve hours.
//!
//! ## Features
//!
//! - **Unlock table**: persisted item -> expiry map with lazy and periodic expiry
//! - **Reward gate**: single-flight rewarded-ad flow that grants only on a completed view
//! - **Entitlement**: cached subscription flag that bypasses every lock
//! - **Catalog projection**: 50音順 and rate sorts with locked rows partitioned last
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use yasai_gate::ads::ScriptedAdPresenter;
//! use yasai_gate::clock::SystemClock;
//! use yasai_gate::entitlement::StoredEntitlementSource;
//! use yasai_gate::storage::MemoryKeyValueStore;
//! use yasai_gate::{SubsystemSettings, UnlockSubsystem};
//!
//! # async fn run() {
//! let kv = Arc::new(MemoryKeyValueStore::new());
//! let presenter = Arc::new(ScriptedAdPresenter::new());
//! presenter.push_rewarded();
//!
//! let subsystem = UnlockSubsystem::new(
//!     kv.clone(),
//!     presenter,
//!     Arc::new(StoredEntitlementSource::new(kv)),
//!     Arc::new(SystemClock),
//!     SubsystemSettings::default(),
//! );
//! subsystem.init().await;
//!
//! if subsystem.request_unlock("だいこん").await {
//!     assert!(!subsystem.is_locked("だいこん").await);
//! }
//! subsystem.teardown().await;
//! # }
//! ```

pub mod ads;
pub mod catalog;
pub mod cli;
pub mod clock;
pub mod entitlement;
pub mod gate;
pub mod periodic;
pub mod storage;
pub mod subsystem;
pub mod unlock;

// Re-exports for convenience
pub use ads::{AdError, AdEvent, AdPresenter, Reward};
pub use catalog::{
    project, CatalogItem, CatalogRow, Collator, LockableSet, SortKey, SortOrder, SortSpec,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entitlement::{EntitlementError, EntitlementFlag, EntitlementSource, Entitlements};
pub use gate::{GateSettings, RewardGate, UnlockOutcome};
pub use periodic::PeriodicTask;
pub use storage::{KeyValueStore, StoreError};
pub use subsystem::{SubsystemSettings, UnlockSubsystem};
pub use unlock::{
    RemainingStyle, RemainingTime, SweepReport, UnlockError, UnlockManager, UnlockRecord,
    UnlockSnapshot, UNLOCK_DURATION,
};
