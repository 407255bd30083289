//! Background sweep of expired unlocks
//!
//! Sweeping is advisory cleanup: reads already treat expired records as
//! absent, so a missed or failed sweep never changes what users see.

use std::sync::Arc;
use std::time::Duration;

use super::UnlockManager;
use crate::clock::Clock;
use crate::periodic::PeriodicTask;

/// Start sweeping `manager` every `interval` until the handle is dropped
pub fn spawn_sweeper(
    manager: Arc<UnlockManager>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn("unlock-sweep", interval, move || {
        let manager = manager.clone();
        let clock = clock.clone();
        async move {
            match manager.sweep(clock.now_ms()).await {
                Ok(report) if !report.removed.is_empty() => {
                    tracing::debug!(removed = ?report.removed, "Sweep tick");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Unlock sweep failed: {}", e),
            }
        }
    })
}
