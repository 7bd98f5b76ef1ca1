//! In-memory injury store.
//!
//! Holds the latest accepted report keyed by `(team, player)`, in report
//! order. Only the scheduler writes to it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::models::{InjuryKey, InjuryNotification, InjuryRecord};

/// Current injury records.
#[derive(Debug, Clone, Default)]
pub struct InjuryStore {
    records: Vec<InjuryRecord>,
    index: HashMap<InjuryKey, usize>,
}

impl InjuryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a batch. A repeated key keeps its first position
    /// and takes the later record.
    fn from_batch(records: impl IntoIterator<Item = InjuryRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            store.upsert(record);
        }
        store
    }

    fn upsert(&mut self, record: InjuryRecord) {
        let key = record.key();
        match self.index.get(&key) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Swap in a new batch.
    ///
    /// Records that are new or named by a notification are stamped with
    /// `now`; the rest keep the timestamp they already had.
    pub fn replace(
        &mut self,
        records: Vec<InjuryRecord>,
        notifications: &[InjuryNotification],
        now: DateTime<Utc>,
    ) {
        let changed: HashSet<InjuryKey> = notifications.iter().map(InjuryNotification::key).collect();

        let stamped = records.into_iter().map(|mut record| {
            let key = record.key();
            record.last_update = match self.get(&key) {
                Some(previous) if !changed.contains(&key) => previous.last_update.or(Some(now)),
                _ => Some(now),
            };
            record
        });

        *self = Self::from_batch(stamped.collect::<Vec<_>>());
    }

    /// Fill the store at startup, stamping every record with `now`.
    pub fn populate(&mut self, records: Vec<InjuryRecord>, now: DateTime<Utc>) {
        *self = Self::from_batch(records.into_iter().map(|mut record| {
            record.last_update = Some(now);
            record
        }));
    }

    /// Drop records not updated within `ttl`. Returns how many were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let cutoff = now - ttl;
        let before = self.records.len();
        let kept: Vec<InjuryRecord> = self
            .records
            .drain(..)
            .filter(|record| record.last_update.is_none_or(|ts| ts >= cutoff))
            .collect();
        *self = Self::from_batch(kept);
        before - self.records.len()
    }

    /// Records in report order.
    pub fn records(&self) -> &[InjuryRecord] {
        &self.records
    }

    pub fn get(&self, key: &InjuryKey) -> Option<&InjuryRecord> {
        self.index.get(key).map(|&position| &self.records[position])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::InjuryStatus;

    fn record(team: &str, player: &str, status: InjuryStatus) -> InjuryRecord {
        InjuryRecord {
            game: String::new(),
            team: team.into(),
            player: player.into(),
            status,
            injury: String::new(),
            last_update: None,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_populate_stamps_everything() {
        let mut store = InjuryStore::new();
        store.populate(
            vec![
                record("Lakers", "A", InjuryStatus::Out),
                record("Lakers", "B", InjuryStatus::Probable),
            ],
            at(1),
        );

        assert_eq!(store.len(), 2);
        assert!(store.records().iter().all(|r| r.last_update == Some(at(1))));
    }

    #[test]
    fn test_replace_carries_forward_unchanged() {
        let mut store = InjuryStore::new();
        store.populate(
            vec![
                record("Lakers", "A", InjuryStatus::Out),
                record("Lakers", "B", InjuryStatus::Probable),
            ],
            at(1),
        );

        let changed = record("Lakers", "B", InjuryStatus::Out);
        let notification = InjuryNotification::status_change(
            &record("Lakers", "B", InjuryStatus::Probable),
            &changed,
            at(2),
        );
        store.replace(
            vec![record("Lakers", "A", InjuryStatus::Out), changed],
            &[notification],
            at(2),
        );

        let a = store.get(&InjuryKey::new("Lakers", "A")).unwrap();
        let b = store.get(&InjuryKey::new("Lakers", "B")).unwrap();
        assert_eq!(a.last_update, Some(at(1)));
        assert_eq!(b.last_update, Some(at(2)));
        assert_eq!(b.status, InjuryStatus::Out);
    }

    #[test]
    fn test_replace_stamps_new_keys_and_drops_missing() {
        let mut store = InjuryStore::new();
        store.populate(vec![record("Lakers", "A", InjuryStatus::Out)], at(1));

        store.replace(vec![record("Celtics", "C", InjuryStatus::Doubtful)], &[], at(3));

        assert_eq!(store.len(), 1);
        assert!(store.get(&InjuryKey::new("Lakers", "A")).is_none());
        let c = store.get(&InjuryKey::new("Celtics", "C")).unwrap();
        assert_eq!(c.last_update, Some(at(3)));
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let mut store = InjuryStore::new();
        store.populate(
            vec![
                record("Lakers", "A", InjuryStatus::Out),
                record("Lakers", "B", InjuryStatus::Out),
                record("Lakers", "A", InjuryStatus::Available),
            ],
            at(1),
        );

        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].player, "A");
        assert_eq!(store.records()[0].status, InjuryStatus::Available);
    }

    #[test]
    fn test_sweep_drops_stale_records() {
        let mut store = InjuryStore::new();
        store.populate(vec![record("Lakers", "A", InjuryStatus::Out)], at(1));
        store.replace(
            vec![
                record("Lakers", "A", InjuryStatus::Out),
                record("Lakers", "B", InjuryStatus::Out),
            ],
            &[],
            at(5),
        );

        let removed = store.sweep(at(5), Duration::hours(2));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&InjuryKey::new("Lakers", "B")).is_some());
        assert!(store.get(&InjuryKey::new("Lakers", "A")).is_none());
    }
}
