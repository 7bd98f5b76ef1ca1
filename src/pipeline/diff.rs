//! Diff calculation between the stored report and a fresh batch.
//!
//! Produces the notifications pushed to subscribers: additions, status
//! changes and removals. Removals are only reported for teams that appear in
//! the fresh batch, since a team missing entirely usually means its section
//! has not been submitted yet.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{InjuryKey, InjuryNotification, InjuryRecord};
use crate::pipeline::store::InjuryStore;

/// Calculate notifications for moving from `previous` to `current`.
///
/// Order is the batch order for additions and status changes, followed by
/// the store order for removals.
pub fn diff(
    previous: &InjuryStore,
    current: &[InjuryRecord],
    now: DateTime<Utc>,
) -> Vec<InjuryNotification> {
    // Repeated keys keep their first position and take the later record.
    let mut order: Vec<InjuryKey> = Vec::new();
    let mut latest: HashMap<InjuryKey, &InjuryRecord> = HashMap::new();
    for record in current {
        let key = record.key();
        if latest.insert(key.clone(), record).is_none() {
            order.push(key);
        }
    }

    let teams: HashSet<&str> = current.iter().map(|r| r.team.as_str()).collect();
    let mut notifications = Vec::new();

    for key in &order {
        let Some(&curr) = latest.get(key) else {
            continue;
        };
        match previous.get(key) {
            None => notifications.push(InjuryNotification::added(curr, now)),
            Some(prev) if prev.status != curr.status => {
                notifications.push(InjuryNotification::status_change(prev, curr, now));
            }
            Some(_) => {}
        }
    }

    for prev in previous.records() {
        if !latest.contains_key(&prev.key()) && teams.contains(prev.team.as_str()) {
            notifications.push(InjuryNotification::removed(prev, now));
        }
    }

    notifications
}
