use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use washbay_core::SlotAvailability;

/// Authoritative capacity view at a point in time. The server builds these
/// from the capacity store; clients compare `content_hash` against their last
/// known value to detect change cheaply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub dates: BTreeMap<NaiveDate, i32>,
    pub as_of: DateTime<Utc>,
    pub content_hash: String,
}

impl CapacitySnapshot {
    pub fn new(dates: BTreeMap<NaiveDate, i32>, as_of: DateTime<Utc>) -> Self {
        let content_hash = content_hash(&dates);
        Self {
            dates,
            as_of,
            content_hash,
        }
    }

    pub fn from_rows(rows: &[SlotAvailability], as_of: DateTime<Utc>) -> Self {
        let dates = rows
            .iter()
            .map(|row| (row.slot_date, row.available))
            .collect();
        Self::new(dates, as_of)
    }
}

/// Digest over the ordered `date=available` pairs. Identical content always
/// produces an identical hash regardless of how the map was assembled, which
/// is the whole contract: the BTreeMap fixes iteration order.
pub fn content_hash(dates: &BTreeMap<NaiveDate, i32>) -> String {
    let mut hasher = Sha256::new();
    for (date, available) in dates {
        hasher.update(date.to_string().as_bytes());
        hasher.update(b"=");
        hasher.update(available.to_le_bytes());
        hasher.update(b";");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Dates whose availability differs between two views, including dates
/// present on only one side. Drives targeted UI refresh after a sync.
pub fn changed_dates(
    old: &BTreeMap<NaiveDate, i32>,
    new: &BTreeMap<NaiveDate, i32>,
) -> BTreeSet<NaiveDate> {
    let mut changed = BTreeSet::new();
    for (date, available) in new {
        if old.get(date) != Some(available) {
            changed.insert(*date);
        }
    }
    for date in old.keys() {
        if !new.contains_key(date) {
            changed.insert(*date);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
    }

    #[test]
    fn test_identical_content_hashes_equal() {
        let a: BTreeMap<_, _> = [(date(16), 8), (date(23), 5)].into_iter().collect();
        let b: BTreeMap<_, _> = [(date(23), 5), (date(16), 8)].into_iter().collect();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_differing_content_hashes_differ() {
        let a: BTreeMap<_, _> = [(date(16), 8)].into_iter().collect();
        let b: BTreeMap<_, _> = [(date(16), 7)].into_iter().collect();
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_changed_dates_is_exactly_the_diff() {
        let old: BTreeMap<_, _> = [(date(16), 8), (date(23), 5), (date(30), 3)]
            .into_iter()
            .collect();
        let new: BTreeMap<_, _> = [(date(16), 8), (date(23), 4), (date(6), 8)]
            .into_iter()
            .collect();

        let changed = changed_dates(&old, &new);
        let expected: BTreeSet<_> = [date(6), date(23), date(30)].into_iter().collect();
        assert_eq!(changed, expected);
    }

    #[test]
    fn test_snapshot_from_rows_matches_manual_hash() {
        let rows = vec![
            SlotAvailability {
                slot_date: date(16),
                available: 6,
                total: 8,
            },
            SlotAvailability {
                slot_date: date(23),
                available: 8,
                total: 8,
            },
        ];
        let snapshot = CapacitySnapshot::from_rows(&rows, Utc::now());
        let manual: BTreeMap<_, _> = [(date(16), 6), (date(23), 8)].into_iter().collect();
        assert_eq!(snapshot.content_hash, content_hash(&manual));
    }
}
