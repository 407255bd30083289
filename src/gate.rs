//! Reward gate
//!
//! Sequences one rewarded ad presentation with the unlock grant. A grant only
//! happens after the presenter reports `RewardEarned` followed by `Closed` in
//! the same presentation, and each successful view grants exactly once.
//!
//! The gate is single-flight: a request that arrives while another is
//! showing an ad returns [`UnlockOutcome::InFlight`] without touching the
//! presenter. After every attempt a reload of the next ad unit is started in
//! the background; the caller's result never waits on it.
//!
//! Once [`RewardGate::dispose`] is called, pending requests resolve to
//! [`UnlockOutcome::Disposed`] and late ad events are dropped. New requests
//! are refused until [`RewardGate::revive`]; a revived gate never resumes a
//! presentation started before the dispose.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::ads::{AdError, AdEvent, AdPresenter};
use crate::clock::{duration_ms, Clock};
use crate::entitlement::EntitlementFlag;
use crate::unlock::{UnlockManager, UnlockRecord};

/// Default bound on preparing a rewarded unit
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Result of one unlock request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum UnlockOutcome {
    /// Reward confirmed and the unlock persisted
    Granted { record: UnlockRecord },
    /// Subscription active; nothing to unlock
    AlreadyEntitled,
    /// The ad was closed before the reward was earned
    Dismissed,
    /// The ad could not be loaded or shown
    AdUnavailable { reason: String },
    /// Another request is already showing an ad
    InFlight,
    /// Reward confirmed but the unlock could not be saved
    PersistFailed { reason: String },
    /// The gate was torn down before the request resolved
    Disposed,
}

impl UnlockOutcome {
    /// Whether the item is now readable because of this request.
    ///
    /// An entitled user counts as a success; every other non-grant is a
    /// failure.
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            UnlockOutcome::Granted { .. } | UnlockOutcome::AlreadyEntitled
        )
    }
}

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub unlock_duration: Duration,
    pub load_timeout: Duration,
    pub reload_after_show: bool,
    /// Extra grant attempts after a failed save
    pub persist_retries: u32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            unlock_duration: crate::unlock::UNLOCK_DURATION,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            reload_after_show: true,
            persist_retries: 1,
        }
    }
}

/// How a presentation ended
enum Presentation {
    Rewarded,
    Dismissed,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RewardGate {
    presenter: Arc<dyn AdPresenter>,
    manager: Arc<UnlockManager>,
    entitlement: EntitlementFlag,
    clock: Arc<dyn Clock>,
    settings: GateSettings,
    in_flight: AtomicBool,
    /// Cancelled on dispose, replaced on revive
    disposed: Mutex<CancellationToken>,
}

impl std::fmt::Debug for RewardGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardGate")
            .field("settings", &self.settings)
            .field("in_flight", &self.is_in_flight())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl RewardGate {
    pub fn new(
        presenter: Arc<dyn AdPresenter>,
        manager: Arc<UnlockManager>,
        entitlement: EntitlementFlag,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presenter,
            manager,
            entitlement,
            clock,
            settings: GateSettings::default(),
            in_flight: AtomicBool::new(false),
            disposed: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_settings(mut self, settings: GateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.lock().is_cancelled()
    }

    /// Detach from any running presentation and refuse further requests
    pub fn dispose(&self) {
        let token = self.disposed.lock();
        if !token.is_cancelled() {
            tracing::debug!("Reward gate disposed");
            token.cancel();
        }
    }

    /// Accept requests again after [`RewardGate::dispose`].
    ///
    /// Returns whether the gate was disposed. Requests that were pending at
    /// dispose time still resolve to `Disposed`.
    pub fn revive(&self) -> bool {
        let mut token = self.disposed.lock();
        if !token.is_cancelled() {
            return false;
        }
        *token = CancellationToken::new();
        tracing::debug!("Reward gate revived");
        true
    }

    fn generation(&self) -> CancellationToken {
        self.disposed.lock().clone()
    }

    /// Make sure a rewarded unit is loaded, bounded by the load timeout
    pub async fn preload(&self) -> Result<(), AdError> {
        if self.presenter.is_ready() {
            return Ok(());
        }
        let timeout = self.settings.load_timeout;
        match tokio::time::timeout(timeout, self.presenter.load_rewarded()).await {
            Ok(result) => result,
            Err(_) => Err(AdError::LoadTimeout(duration_ms(timeout))),
        }
    }

    /// Show a rewarded ad and unlock `item_id` if the reward is earned
    pub async fn request_unlock(&self, item_id: &str) -> UnlockOutcome {
        let disposed = self.generation();
        if disposed.is_cancelled() {
            return UnlockOutcome::Disposed;
        }
        if self.entitlement.is_active() {
            tracing::debug!(item_id = %item_id, "Unlock requested while entitled");
            return UnlockOutcome::AlreadyEntitled;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(item_id = %item_id, "Unlock already in flight");
            return UnlockOutcome::InFlight;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let presentation = tokio::select! {
            biased;
            _ = disposed.cancelled() => None,
            result = self.present() => Some(result),
        };

        let outcome = match presentation {
            None => UnlockOutcome::Disposed,
            Some(Err(AdError::AlreadyShowing)) => UnlockOutcome::InFlight,
            Some(Err(e)) => {
                tracing::warn!(item_id = %item_id, "Rewarded ad unavailable: {}", e);
                UnlockOutcome::AdUnavailable {
                    reason: e.to_string(),
                }
            }
            Some(Ok(Presentation::Dismissed)) => {
                tracing::debug!(item_id = %item_id, "Rewarded ad dismissed");
                UnlockOutcome::Dismissed
            }
            Some(Ok(Presentation::Rewarded)) if disposed.is_cancelled() => UnlockOutcome::Disposed,
            Some(Ok(Presentation::Rewarded)) => self.commit(item_id).await,
        };

        self.schedule_reload(disposed);
        outcome
    }

    async fn present(&self) -> Result<Presentation, AdError> {
        self.preload().await?;
        let mut events = self.presenter.show_rewarded().await?;

        let mut rewarded = false;
        while let Some(event) = events.recv().await {
            match event {
                AdEvent::RewardEarned(reward) => {
                    tracing::debug!(kind = %reward.kind, amount = reward.amount, "Reward earned");
                    rewarded = true;
                }
                AdEvent::Closed => {
                    return Ok(if rewarded {
                        Presentation::Rewarded
                    } else {
                        Presentation::Dismissed
                    });
                }
                AdEvent::Error(message) => return Err(AdError::ShowFailed(message)),
            }
        }

        Err(AdError::ShowFailed(
            "presentation ended without closing".to_string(),
        ))
    }

    /// Grant with bounded immediate retries
    async fn commit(&self, item_id: &str) -> UnlockOutcome {
        let attempts = self.settings.persist_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let now = self.clock.now_ms();
            match self
                .manager
                .grant(item_id, now, self.settings.unlock_duration)
                .await
            {
                Ok(record) => return UnlockOutcome::Granted { record },
                Err(e) => {
                    tracing::warn!(item_id = %item_id, attempt, "Failed to persist unlock: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        tracing::error!(item_id = %item_id, "Reward earned but unlock was not saved");
        UnlockOutcome::PersistFailed { reason: last_error }
    }

    fn schedule_reload(&self, disposed: CancellationToken) {
        if !self.settings.reload_after_show || disposed.is_cancelled() {
            return;
        }

        let presenter = self.presenter.clone();
        let timeout = self.settings.load_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = disposed.cancelled() => {}
                result = tokio::time::timeout(timeout, presenter.load_rewarded()) => match result {
                    Ok(Ok(())) => tracing::debug!("Next rewarded ad loaded"),
                    Ok(Err(e)) => tracing::debug!("Rewarded ad reload failed: {}", e),
                    Err(_) => tracing::debug!("Rewarded ad reload timed out"),
                },
            }
        });
    }
}

impl Drop for RewardGate {
    fn drop(&mut self) {
        self.disposed.get_mut().cancel();
    }
}
