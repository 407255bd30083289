//! Rewarded ad presenter interface
//!
//! The ad SDK itself lives outside this crate. The unlock flow only needs a
//! rewarded unit that can be loaded and shown, and a per-presentation event
//! stream that ends with either `Closed` or `Error`. A `RewardEarned` event
//! may arrive before `Closed`.
//!
//! Dropping the event receiver detaches from the presentation; presenters
//! must tolerate sends to a dropped receiver.

use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod scripted;

pub use scripted::ScriptedAdPresenter;

/// Reward attached to a completed view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    pub kind: String,
    pub amount: u32,
}

impl Default for Reward {
    fn default() -> Self {
        Self {
            kind: "unlock".to_string(),
            amount: 1,
        }
    }
}

/// Events emitted during one rewarded presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdEvent {
    /// The user watched long enough to earn the reward
    RewardEarned(Reward),
    /// The ad was dismissed; terminal
    Closed,
    /// The ad failed while showing; terminal
    Error(String),
}

/// Receiver side of one presentation's events
pub type AdEvents = mpsc::UnboundedReceiver<AdEvent>;

/// Ad operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdError {
    #[error("No rewarded ad is loaded")]
    NotLoaded,

    #[error("A rewarded ad is already showing")]
    AlreadyShowing,

    #[error("Rewarded ad failed to load: {0}")]
    LoadFailed(String),

    #[error("Rewarded ad load timed out after {0}ms")]
    LoadTimeout(u64),

    #[error("Rewarded ad failed to show: {0}")]
    ShowFailed(String),
}

/// Rewarded ad unit, as exposed by the platform ad SDK
#[async_trait]
pub trait AdPresenter: Send + Sync {
    /// Whether a rewarded unit is loaded and can be shown immediately
    fn is_ready(&self) -> bool;

    /// Load the next rewarded unit
    async fn load_rewarded(&self) -> Result<(), AdError>;

    /// Show the loaded unit.
    ///
    /// Concurrent calls while a presentation is running must be rejected
    /// with [`AdError::AlreadyShowing`].
    async fn show_rewarded(&self) -> Result<AdEvents, AdError>;
}
