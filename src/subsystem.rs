//! Unlock subsystem
//!
//! The explicitly constructed object the UI layer holds. It wires the unlock
//! manager, reward gate, entitlement flag and catalog projection together and
//! owns the background sweep and entitlement poll, which run between
//! [`UnlockSubsystem::init`] and [`UnlockSubsystem::teardown`]. The pair may
//! be repeated, e.g. when the host app goes to the background and returns.
//!
//! Every public query collapses internal failures to a plain `bool` or
//! `Option`; nothing here returns an error the UI has to handle except
//! entitlement confirmation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::ads::AdPresenter;
use crate::catalog::{self, CatalogItem, CatalogRow, Collator, LockableSet, SortSpec};
use crate::clock::Clock;
use crate::entitlement::{
    spawn_entitlement_poller, EntitlementError, EntitlementSource, Entitlements,
    ENTITLEMENT_POLL_INTERVAL,
};
use crate::gate::{GateSettings, RewardGate, UnlockOutcome};
use crate::periodic::PeriodicTask;
use crate::storage::KeyValueStore;
use crate::unlock::{spawn_sweeper, RemainingStyle, UnlockManager, UnlockStore, SWEEP_INTERVAL};

#[derive(Debug, Clone)]
pub struct SubsystemSettings {
    pub gate: GateSettings,
    pub sweep_interval: Duration,
    pub entitlement_poll_interval: Duration,
    pub lockable: LockableSet,
    pub remaining_style: RemainingStyle,
    pub collator: Collator,
}

impl Default for SubsystemSettings {
    fn default() -> Self {
        Self {
            gate: GateSettings::default(),
            sweep_interval: SWEEP_INTERVAL,
            entitlement_poll_interval: ENTITLEMENT_POLL_INTERVAL,
            lockable: LockableSet::default(),
            remaining_style: RemainingStyle::default(),
            collator: Collator::default(),
        }
    }
}

enum LifecycleState {
    Stopped,
    Starting,
    Running(Vec<PeriodicTask>),
}

/// Bumped by every `init` and `teardown`; an `init` only installs its tasks
/// if no other transition happened while it was loading
struct Lifecycle {
    generation: u64,
    state: LifecycleState,
}

pub struct UnlockSubsystem {
    settings: SubsystemSettings,
    clock: Arc<dyn Clock>,
    manager: Arc<UnlockManager>,
    entitlements: Arc<Entitlements>,
    gate: RewardGate,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for UnlockSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockSubsystem")
            .field("settings", &self.settings)
            .field("entitlements", &self.entitlements)
            .field("running", &self.is_running())
            .finish()
    }
}

impl UnlockSubsystem {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        presenter: Arc<dyn AdPresenter>,
        source: Arc<dyn EntitlementSource>,
        clock: Arc<dyn Clock>,
        settings: SubsystemSettings,
    ) -> Self {
        let manager = Arc::new(
            UnlockManager::new(UnlockStore::new(kv.clone()))
                .with_duration(settings.gate.unlock_duration),
        );
        let entitlements = Arc::new(Entitlements::new(kv, source));
        let gate = RewardGate::new(presenter, manager.clone(), entitlements.flag(), clock.clone())
            .with_settings(settings.gate.clone());

        Self {
            settings,
            clock,
            manager,
            entitlements,
            gate,
            lifecycle: Mutex::new(Lifecycle {
                generation: 0,
                state: LifecycleState::Stopped,
            }),
        }
    }

    pub fn settings(&self) -> &SubsystemSettings {
        &self.settings
    }

    pub fn manager(&self) -> &Arc<UnlockManager> {
        &self.manager
    }

    pub fn entitlements(&self) -> &Arc<Entitlements> {
        &self.entitlements
    }

    pub fn gate(&self) -> &RewardGate {
        &self.gate
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Whether background tasks are running
    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle.lock().state, LifecycleState::Running(_))
    }

    /// Load cached state, start background tasks and prepare the first ad.
    ///
    /// Calling `init` while running or starting does nothing. A `teardown`
    /// that lands while `init` is still loading wins: no tasks are started.
    pub async fn init(&self) {
        let generation = {
            let mut lifecycle = self.lifecycle.lock();
            if !matches!(lifecycle.state, LifecycleState::Stopped) {
                return;
            }
            lifecycle.generation += 1;
            lifecycle.state = LifecycleState::Starting;
            self.gate.revive();
            lifecycle.generation
        };

        self.entitlements.load_cached().await;
        self.entitlements.refresh().await;

        if let Err(e) = self.manager.sweep(self.now_ms()).await {
            tracing::warn!("Startup sweep failed: {}", e);
        }

        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.generation != generation {
                tracing::debug!("Unlock subsystem torn down during init");
                return;
            }
            let sweeper = spawn_sweeper(
                self.manager.clone(),
                self.clock.clone(),
                self.settings.sweep_interval,
            );
            let poller = spawn_entitlement_poller(
                self.entitlements.clone(),
                self.settings.entitlement_poll_interval,
            );
            lifecycle.state = LifecycleState::Running(vec![sweeper, poller]);
        }

        if !self.entitlements.is_entitled() {
            if let Err(e) = self.gate.preload().await {
                tracing::debug!("Rewarded ad not ready at startup: {}", e);
            }
        }

        tracing::info!(
            entitled = self.entitlements.is_entitled(),
            "Unlock subsystem initialized"
        );
    }

    /// Stop background tasks and detach from any running ad.
    ///
    /// Until the next `init`, every unlock request resolves to `false`.
    pub async fn teardown(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.generation += 1;
            match std::mem::replace(&mut lifecycle.state, LifecycleState::Stopped) {
                LifecycleState::Running(tasks) => tasks,
                LifecycleState::Starting | LifecycleState::Stopped => Vec::new(),
            }
        };
        self.gate.dispose();
        for task in tasks {
            task.shutdown().await;
        }
        tracing::info!("Unlock subsystem torn down");
    }

    pub fn is_entitled(&self) -> bool {
        self.entitlements.is_entitled()
    }

    /// Record a purchase or restore confirmation
    pub async fn confirm_entitlement(&self, active: bool) -> Result<(), EntitlementError> {
        self.entitlements.confirm(active).await
    }

    pub fn is_lockable(&self, item_id: &str) -> bool {
        self.settings.lockable.contains(item_id)
    }

    /// Whether `item_id` is currently hidden behind the unlock gate
    pub async fn is_locked(&self, item_id: &str) -> bool {
        if !self.is_lockable(item_id) || self.is_entitled() {
            return false;
        }
        !self.manager.is_unlocked(item_id, self.now_ms()).await
    }

    /// Remaining unlock time for display, `None` when locked, expired or
    /// entitled
    pub async fn remaining_label(&self, item_id: &str) -> Option<String> {
        if self.is_entitled() {
            return None;
        }
        self.manager
            .remaining_time(item_id, self.now_ms())
            .await
            .map(|r| r.label(self.settings.remaining_style))
    }

    /// `true` iff the item is readable as a result of this request
    pub async fn request_unlock(&self, item_id: &str) -> bool {
        self.request_unlock_outcome(item_id).await.is_granted()
    }

    pub async fn request_unlock_outcome(&self, item_id: &str) -> UnlockOutcome {
        self.gate.request_unlock(item_id).await
    }

    /// Ordered catalog with per-row lock state
    pub async fn ordered_catalog(&self, items: &[CatalogItem], sort: SortSpec) -> Vec<CatalogRow> {
        let mut items = items.to_vec();
        self.settings.lockable.apply(&mut items);

        let snapshot = self.manager.snapshot(self.now_ms()).await;
        catalog::project(
            &items,
            &snapshot,
            self.is_entitled(),
            sort,
            &self.settings.collator,
        )
    }
}
