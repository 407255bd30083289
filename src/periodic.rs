//! Cancellable periodic background tasks
//!
//! Runs a closure on a fixed interval until the owning [`PeriodicTask`] is
//! shut down or dropped. The first run happens one full interval after
//! spawn, matching a plain repeating timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a running periodic task.
///
/// Dropping the handle cancels the task; [`PeriodicTask::shutdown`] also
/// waits for an in-progress tick to finish.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` every `interval` on the current tokio runtime
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(task = name, "Periodic task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        tick().await;
                    }
                }
            }
        });

        tracing::debug!(
            task = name,
            interval_ms = crate::clock::duration_ms(interval),
            "Periodic task started"
        );

        Self {
            name,
            cancel,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task is still scheduled
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .task
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false)
    }

    /// Cancel the task and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(task = self.name, "Periodic task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
