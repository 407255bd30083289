//! Scripted ad presenter
//!
//! Plays back queued presentations instead of talking to an ad network.
//! Used by tests and by the CLI's `unlock --simulate` command.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{AdError, AdEvent, AdEvents, AdPresenter, Reward};

/// One scripted presentation
#[derive(Debug, Clone)]
pub enum ScriptedShow {
    /// `show_rewarded` succeeds and emits these events in order
    Events(Vec<AdEvent>),
    /// `show_rewarded` itself fails
    Reject(AdError),
}

#[derive(Debug, Default)]
pub struct ScriptedAdPresenter {
    shows: Mutex<VecDeque<ScriptedShow>>,
    loads: Mutex<VecDeque<Result<(), AdError>>>,
    ready: AtomicBool,
    showing: Arc<AtomicBool>,
    event_delay: Mutex<Option<Duration>>,
    load_delay: Mutex<Option<Duration>>,
    show_count: AtomicUsize,
    load_count: AtomicUsize,
}

impl ScriptedAdPresenter {
    /// A presenter with a unit already loaded
    pub fn new() -> Self {
        let presenter = Self::default();
        presenter.ready.store(true, Ordering::SeqCst);
        presenter
    }

    /// A presenter that has to load before its first show
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// Delay before each presentation event is delivered
    pub fn with_event_delay(self, delay: Duration) -> Self {
        *self.event_delay.lock() = Some(delay);
        self
    }

    /// Delay before each load completes
    pub fn with_load_delay(self, delay: Duration) -> Self {
        *self.load_delay.lock() = Some(delay);
        self
    }

    pub fn push(&self, show: ScriptedShow) {
        self.shows.lock().push_back(show);
    }

    /// Queue a view that earns the reward and then closes
    pub fn push_rewarded(&self) {
        self.push(ScriptedShow::Events(vec![
            AdEvent::RewardEarned(Reward::default()),
            AdEvent::Closed,
        ]));
    }

    /// Queue a view the user closes before earning the reward
    pub fn push_dismissed(&self) {
        self.push(ScriptedShow::Events(vec![AdEvent::Closed]));
    }

    /// Queue a view that errors mid-presentation
    pub fn push_error(&self, message: &str) {
        self.push(ScriptedShow::Events(vec![AdEvent::Error(message.to_string())]));
    }

    /// Queue the result of the next `load_rewarded` call
    pub fn push_load_result(&self, result: Result<(), AdError>) {
        self.loads.lock().push_back(result);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn show_count(&self) -> usize {
        self.show_count.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn is_showing(&self) -> bool {
        self.showing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdPresenter for ScriptedAdPresenter {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn load_rewarded(&self) -> Result<(), AdError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.loads.lock().pop_front().unwrap_or(Ok(()));
        self.ready.store(result.is_ok(), Ordering::SeqCst);
        result
    }

    async fn show_rewarded(&self) -> Result<AdEvents, AdError> {
        if self
            .showing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AdError::AlreadyShowing);
        }

        if !self.is_ready() {
            self.showing.store(false, Ordering::SeqCst);
            return Err(AdError::NotLoaded);
        }

        let script = self.shows.lock().pop_front();
        let events = match script {
            Some(ScriptedShow::Events(events)) => events,
            Some(ScriptedShow::Reject(err)) => {
                self.showing.store(false, Ordering::SeqCst);
                return Err(err);
            }
            None => {
                self.showing.store(false, Ordering::SeqCst);
                return Err(AdError::NotLoaded);
            }
        };

        self.show_count.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        let showing = self.showing.clone();
        let delay = *self.event_delay.lock();

        tokio::spawn(async move {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                // Receiver may already be gone
                let _ = tx.send(event);
            }
            showing.store(false, Ordering::SeqCst);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: AdEvents) -> Vec<AdEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_rewarded_script() {
        let presenter = ScriptedAdPresenter::new();
        presenter.push_rewarded();

        let events = drain(presenter.show_rewarded().await.unwrap()).await;
        assert_eq!(
            events,
            vec![AdEvent::RewardEarned(Reward::default()), AdEvent::Closed]
        );
        assert_eq!(presenter.show_count(), 1);
        assert!(!presenter.is_ready());
    }

    #[tokio::test]
    async fn test_show_without_script_or_load() {
        let presenter = ScriptedAdPresenter::new();
        assert_eq!(presenter.show_rewarded().await.unwrap_err(), AdError::NotLoaded);

        let unloaded = ScriptedAdPresenter::unloaded();
        unloaded.push_dismissed();
        assert_eq!(unloaded.show_rewarded().await.unwrap_err(), AdError::NotLoaded);

        unloaded.load_rewarded().await.unwrap();
        assert!(unloaded.is_ready());
        assert_eq!(drain(unloaded.show_rewarded().await.unwrap()).await, vec![AdEvent::Closed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_show_is_rejected() {
        let presenter = ScriptedAdPresenter::new().with_event_delay(Duration::from_secs(5));
        presenter.push_rewarded();
        presenter.push_rewarded();

        let first = presenter.show_rewarded().await.unwrap();
        presenter.set_ready(true);
        assert_eq!(
            presenter.show_rewarded().await.unwrap_err(),
            AdError::AlreadyShowing
        );

        drain(first).await;
        tokio::task::yield_now().await;
        assert!(!presenter.is_showing());
    }

    #[tokio::test]
    async fn test_load_failure_clears_ready() {
        let presenter = ScriptedAdPresenter::new();
        presenter.push_load_result(Err(AdError::LoadFailed("no fill".into())));

        assert!(presenter.load_rewarded().await.is_err());
        assert!(!presenter.is_ready());
        assert_eq!(presenter.load_count(), 1);
    }
}
