//! Remaining unlock time and its display label

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::UnlockRecord;
use crate::clock::duration_ms;

const HOUR_MS: u64 = 60 * 60 * 1000;
const MINUTE_MS: u64 = 60 * 1000;

/// `max(0, unlocked_until - now)`
pub fn remaining_duration(record: &UnlockRecord, now: u64) -> Duration {
    Duration::from_millis(record.unlocked_until.saturating_sub(now))
}

/// Strictly positive time left on an unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemainingTime(Duration);

impl RemainingTime {
    /// `None` when the record is at or past its expiry, which callers must
    /// treat exactly like a missing record.
    pub fn for_record(record: &UnlockRecord, now: u64) -> Option<Self> {
        let left = remaining_duration(record, now);
        if left.is_zero() {
            None
        } else {
            Some(Self(left))
        }
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Whole hours left
    pub fn hours(&self) -> u64 {
        duration_ms(self.0) / HOUR_MS
    }

    /// Whole minutes left after the whole hours
    pub fn minutes(&self) -> u64 {
        (duration_ms(self.0) % HOUR_MS) / MINUTE_MS
    }

    pub fn label(&self, style: RemainingStyle) -> String {
        match style {
            RemainingStyle::Japanese => format!("{}時間{}分", self.hours(), self.minutes()),
            RemainingStyle::Clock => format!("{}:{:02}", self.hours(), self.minutes()),
        }
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label(RemainingStyle::default()))
    }
}

/// How remaining time is rendered for the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainingStyle {
    /// `11時間59分`
    #[default]
    Japanese,
    /// `11:59`
    Clock,
}

impl fmt::Display for RemainingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemainingStyle::Japanese => write!(f, "japanese"),
            RemainingStyle::Clock => write!(f, "clock"),
        }
    }
}

impl FromStr for RemainingStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "japanese" | "ja" => Ok(RemainingStyle::Japanese),
            "clock" | "hh:mm" => Ok(RemainingStyle::Clock),
            _ => Err(format!("Unknown remaining style: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_duration_saturates() {
        let record = UnlockRecord::new("ねぎ", 1_000);
        assert_eq!(remaining_duration(&record, 400), Duration::from_millis(600));
        assert_eq!(remaining_duration(&record, 1_000), Duration::ZERO);
        assert_eq!(remaining_duration(&record, 5_000), Duration::ZERO);
    }

    #[test]
    fn test_zero_remaining_is_absent() {
        let record = UnlockRecord::new("ねぎ", 1_000);
        assert!(RemainingTime::for_record(&record, 999).is_some());
        assert!(RemainingTime::for_record(&record, 1_000).is_none());
        assert!(RemainingTime::for_record(&record, 1_001).is_none());
    }

    #[test]
    fn test_labels() {
        let record = UnlockRecord::new("ねぎ", 12 * HOUR_MS);
        let full = RemainingTime::for_record(&record, 0).unwrap();
        assert_eq!(full.label(RemainingStyle::Japanese), "12時間0分");
        assert_eq!(full.label(RemainingStyle::Clock), "12:00");

        let partial = RemainingTime::for_record(&record, 30 * MINUTE_MS + 1).unwrap();
        assert_eq!(partial.hours(), 11);
        assert_eq!(partial.minutes(), 29);
        assert_eq!(partial.to_string(), "11時間29分");

        let tiny = RemainingTime::for_record(&record, 12 * HOUR_MS - 1).unwrap();
        assert_eq!(tiny.label(RemainingStyle::Clock), "0:00");
    }

    #[test]
    fn test_style_parse() {
        assert_eq!("clock".parse::<RemainingStyle>().unwrap(), RemainingStyle::Clock);
        assert_eq!("JA".parse::<RemainingStyle>().unwrap(), RemainingStyle::Japanese);
        assert!("fancy".parse::<RemainingStyle>().is_err());
    }
}
