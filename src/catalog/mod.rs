//! Catalog sort/lock projection
//!
//! Turns the catalog, an unlock snapshot and the entitlement flag into the
//! ordered list the UI renders, with a lock decision and remaining unlock
//! time per row. [`project`] is a pure function: it performs no I/O and never
//! mutates the unlock table.
//!
//! Ordering rules:
//! - by name: collated by display name, locked rows interleaved
//! - by a rate: unlocked rows first ordered by the rate (missing rates count
//!   as 0, ties by name), then locked rows by name ascending

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::unlock::{RemainingTime, UnlockSnapshot};

pub mod collation;

pub use collation::{CollationKey, Collator};

/// One catalog entry as supplied by the price feed layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub item_id: String,
    pub display_name: String,
    #[serde(default)]
    pub is_lockable: bool,
    /// Change versus last month, as a fraction
    #[serde(default)]
    pub last_month_rate: Option<f64>,
    /// Change versus last year, as a fraction
    #[serde(default)]
    pub last_year_rate: Option<f64>,
}

impl CatalogItem {
    pub fn new(item_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            display_name: display_name.into(),
            is_lockable: false,
            last_month_rate: None,
            last_year_rate: None,
        }
    }

    pub fn lockable(mut self) -> Self {
        self.is_lockable = true;
        self
    }

    pub fn with_rates(mut self, last_month: Option<f64>, last_year: Option<f64>) -> Self {
        self.last_month_rate = last_month;
        self.last_year_rate = last_year;
        self
    }

    fn rate(&self, key: SortKey) -> f64 {
        match key {
            SortKey::Name => 0.0,
            SortKey::LastMonthRate => self.last_month_rate.unwrap_or(0.0),
            SortKey::LastYearRate => self.last_year_rate.unwrap_or(0.0),
        }
    }
}

/// Configured set of item ids that require an unlock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockableSet(HashSet<String>);

impl LockableSet {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.0.contains(item_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mark every listed item lockable; items already lockable stay so
    pub fn apply(&self, items: &mut [CatalogItem]) {
        for item in items.iter_mut() {
            if self.contains(&item.item_id) {
                item.is_lockable = true;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Name,
    LastMonthRate,
    LastYearRate,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Name => write!(f, "name"),
            SortKey::LastMonthRate => write!(f, "month"),
            SortKey::LastYearRate => write!(f, "year"),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" | "50音順" => Ok(SortKey::Name),
            "month" | "last-month" => Ok(SortKey::LastMonthRate),
            "year" | "last-year" => Ok(SortKey::LastYearRate),
            _ => Err(format!("Unknown sort key: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Active catalog ordering; session-local, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(key: SortKey, order: SortOrder) -> Self {
        Self { key, order }
    }

    pub fn alphabetical() -> Self {
        Self::default()
    }

    pub fn is_alphabetical(&self) -> bool {
        self.key == SortKey::Name
    }

    /// Label in the app's sort menu
    pub fn label(&self) -> String {
        let direction = match self.order {
            SortOrder::Ascending => "低い順",
            SortOrder::Descending => "高い順",
        };
        match self.key {
            SortKey::Name => match self.order {
                SortOrder::Ascending => "50音順".to_string(),
                SortOrder::Descending => "50音順（逆順）".to_string(),
            },
            SortKey::LastMonthRate => format!("先月比（{}）", direction),
            SortKey::LastYearRate => format!("昨年比（{}）", direction),
        }
    }
}

/// One projected catalog row
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRow {
    pub item: CatalogItem,
    pub locked: bool,
    /// Time left on a live unlock of a lockable item
    pub remaining: Option<RemainingTime>,
}

/// `item.is_lockable && !is_entitled && !unlocked`
pub fn is_locked(item: &CatalogItem, snapshot: &UnlockSnapshot, is_entitled: bool) -> bool {
    item.is_lockable && !is_entitled && !snapshot.is_unlocked(&item.item_id)
}

/// Order `items` for display and decide each row's lock state
pub fn project(
    items: &[CatalogItem],
    snapshot: &UnlockSnapshot,
    is_entitled: bool,
    sort: SortSpec,
    collator: &Collator,
) -> Vec<CatalogRow> {
    let mut keyed: Vec<(CollationKey, CatalogRow)> = items
        .iter()
        .map(|item| {
            let locked = is_locked(item, snapshot, is_entitled);
            let remaining = if item.is_lockable && !is_entitled {
                snapshot.remaining(&item.item_id)
            } else {
                None
            };
            let row = CatalogRow {
                item: item.clone(),
                locked,
                remaining,
            };
            (collator.sort_key(&item.display_name), row)
        })
        .collect();

    keyed.sort_by(|(a_key, a), (b_key, b)| {
        let by_id = a.item.item_id.cmp(&b.item.item_id);

        if sort.is_alphabetical() {
            return sort.order.apply(a_key.cmp(b_key)).then(by_id);
        }

        let by_name = a_key.cmp(b_key).then(by_id);
        a.locked.cmp(&b.locked).then_with(|| {
            if a.locked {
                by_name
            } else {
                sort.order
                    .apply(a.item.rate(sort.key).total_cmp(&b.item.rate(sort.key)))
                    .then(by_name)
            }
        })
    });

    keyed.into_iter().map(|(_, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unlock::UnlockRecord;

    const HOUR_MS: u64 = 60 * 60 * 1000;
    const NOW: u64 = 1_700_000_000_000;

    fn catalog() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new("tomato", "トマト").with_rates(Some(0.12), Some(-0.05)),
            CatalogItem::new("daikon", "だいこん")
                .lockable()
                .with_rates(Some(0.30), Some(0.10)),
            CatalogItem::new("cabbage", "キャベツ").with_rates(Some(-0.02), None),
            CatalogItem::new("strawberry", "いちご")
                .lockable()
                .with_rates(Some(0.50), Some(0.40)),
            CatalogItem::new("negi", "ねぎ").with_rates(None, Some(0.20)),
            CatalogItem::new("komatsuna", "こまつな")
                .lockable()
                .with_rates(Some(0.05), None),
        ]
    }

    fn ids(rows: &[CatalogRow]) -> Vec<&str> {
        rows.iter().map(|r| r.item.item_id.as_str()).collect()
    }

    fn snapshot(unlocked: &[&str]) -> UnlockSnapshot {
        UnlockSnapshot::new(
            NOW,
            unlocked
                .iter()
                .map(|id| UnlockRecord::new(*id, NOW + 2 * HOUR_MS)),
        )
    }

    #[test]
    fn test_alphabetical_interleaves_locked() {
        let rows = project(
            &catalog(),
            &UnlockSnapshot::empty(NOW),
            false,
            SortSpec::alphabetical(),
            &Collator::Japanese,
        );
        assert_eq!(
            ids(&rows),
            vec!["strawberry", "cabbage", "komatsuna", "daikon", "tomato", "negi"]
        );
        assert!(rows[0].locked);
        assert!(!rows[1].locked);
    }

    #[test]
    fn test_alphabetical_descending() {
        let rows = project(
            &catalog(),
            &UnlockSnapshot::empty(NOW),
            false,
            SortSpec::new(SortKey::Name, SortOrder::Descending),
            &Collator::Japanese,
        );
        assert_eq!(
            ids(&rows),
            vec!["negi", "tomato", "daikon", "komatsuna", "cabbage", "strawberry"]
        );
    }

    #[test]
    fn test_entitlement_unlocks_everything() {
        let rows = project(
            &catalog(),
            &UnlockSnapshot::empty(NOW),
            true,
            SortSpec::new(SortKey::LastMonthRate, SortOrder::Descending),
            &Collator::Japanese,
        );
        assert!(rows.iter().all(|r| !r.locked && r.remaining.is_none()));
        assert_eq!(ids(&rows)[0], "strawberry");
    }

    #[test]
    fn test_numeric_sort_partitions_locked_last() {
        let rows = project(
            &catalog(),
            &snapshot(&["daikon"]),
            false,
            SortSpec::new(SortKey::LastMonthRate, SortOrder::Descending),
            &Collator::Japanese,
        );

        // negi has no rate and sorts as 0
        assert_eq!(
            ids(&rows),
            vec!["daikon", "tomato", "negi", "cabbage", "strawberry", "komatsuna"]
        );
        let first_locked = rows.iter().position(|r| r.locked).unwrap();
        assert!(rows[..first_locked].iter().all(|r| !r.locked));
        assert!(rows[first_locked..].iter().all(|r| r.locked));
    }

    #[test]
    fn test_numeric_ascending_ties_break_by_name() {
        let items = vec![
            CatalogItem::new("c", "にんじん").with_rates(Some(0.1), None),
            CatalogItem::new("a", "かぼちゃ").with_rates(Some(0.1), None),
            CatalogItem::new("b", "なす").with_rates(Some(-0.3), None),
        ];
        let rows = project(
            &items,
            &UnlockSnapshot::empty(NOW),
            false,
            SortSpec::new(SortKey::LastMonthRate, SortOrder::Ascending),
            &Collator::Japanese,
        );
        assert_eq!(ids(&rows), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_remaining_only_for_live_unlocks() {
        let rows = project(
            &catalog(),
            &snapshot(&["daikon", "tomato"]),
            false,
            SortSpec::alphabetical(),
            &Collator::Japanese,
        );
        let daikon = rows.iter().find(|r| r.item.item_id == "daikon").unwrap();
        assert!(!daikon.locked);
        assert_eq!(daikon.remaining.unwrap().hours(), 2);

        // not lockable, so no remaining time even with a record
        let tomato = rows.iter().find(|r| r.item.item_id == "tomato").unwrap();
        assert!(tomato.remaining.is_none());
    }

    #[test]
    fn test_projection_is_deterministic() {
        let items = catalog();
        let snap = snapshot(&["komatsuna"]);
        for sort in [
            SortSpec::alphabetical(),
            SortSpec::new(SortKey::LastYearRate, SortOrder::Descending),
            SortSpec::new(SortKey::LastYearRate, SortOrder::Ascending),
        ] {
            let first = project(&items, &snap, false, sort, &Collator::Japanese);
            let second = project(&items, &snap, false, sort, &Collator::Japanese);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_lockable_set_marks_items() {
        let mut items = vec![
            CatalogItem::new("tomato", "トマト"),
            CatalogItem::new("daikon", "だいこん").lockable(),
        ];
        LockableSet::new(["tomato"]).apply(&mut items);
        assert!(items.iter().all(|i| i.is_lockable));
    }

    #[test]
    fn test_sort_spec_parse_and_label() {
        assert_eq!("month".parse::<SortKey>().unwrap(), SortKey::LastMonthRate);
        assert!("price".parse::<SortKey>().is_err());
        assert_eq!(SortSpec::alphabetical().label(), "50音順");
        assert_eq!(
            SortSpec::new(SortKey::LastYearRate, SortOrder::Descending).label(),
            "昨年比（高い順）"
        );
    }

    #[test]
    fn test_item_json_shape() {
        let items: Vec<CatalogItem> = serde_json::from_str(
            r#"[{"itemId":"daikon","displayName":"だいこん","isLockable":true,"lastMonthRate":0.3}]"#,
        )
        .unwrap();
        assert!(items[0].is_lockable);
        assert_eq!(items[0].last_year_rate, None);
    }
}
