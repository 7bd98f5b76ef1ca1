//! Injury record and notification structures.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player availability as published in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjuryStatus {
    Out,
    Questionable,
    Doubtful,
    Probable,
    Available,
}

impl InjuryStatus {
    pub const ALL: [InjuryStatus; 5] = [
        InjuryStatus::Out,
        InjuryStatus::Questionable,
        InjuryStatus::Doubtful,
        InjuryStatus::Probable,
        InjuryStatus::Available,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InjuryStatus::Out => "Out",
            InjuryStatus::Questionable => "Questionable",
            InjuryStatus::Doubtful => "Doubtful",
            InjuryStatus::Probable => "Probable",
            InjuryStatus::Available => "Available",
        }
    }
}

impl fmt::Display for InjuryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InjuryStatus {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown injury status '{trimmed}'"))
    }
}

/// Composite identity of a tracked player across report cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InjuryKey {
    pub team: String,
    pub player: String,
}

impl InjuryKey {
    pub fn new(team: impl Into<String>, player: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            player: player.into(),
        }
    }
}

impl fmt::Display for InjuryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.team, self.player)
    }
}

/// One player's current injury status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjuryRecord {
    /// Matchup and kickoff descriptor (may be empty)
    pub game: String,

    /// Team label, e.g. "Los Angeles Lakers"
    pub team: String,

    /// Display name in "First Last" form
    pub player: String,

    pub status: InjuryStatus,

    /// Cleaned injury reason
    pub injury: String,

    /// When the status last changed; unset until the store stamps it
    pub last_update: Option<DateTime<Utc>>,
}

impl InjuryRecord {
    pub fn key(&self) -> InjuryKey {
        InjuryKey {
            team: self.team.clone(),
            player: self.player.clone(),
        }
    }
}

/// Kind of change detected between two report cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Added,
    Removed,
    StatusChange,
}

/// A change detected between two report cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjuryNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,

    pub player: String,

    pub team: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<InjuryStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<InjuryStatus>,

    pub timestamp: DateTime<Utc>,
}

impl InjuryNotification {
    pub fn added(record: &InjuryRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Added,
            player: record.player.clone(),
            team: record.team.clone(),
            old_status: None,
            new_status: Some(record.status),
            timestamp,
        }
    }

    pub fn removed(record: &InjuryRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Removed,
            player: record.player.clone(),
            team: record.team.clone(),
            old_status: Some(record.status),
            new_status: None,
            timestamp,
        }
    }

    pub fn status_change(
        previous: &InjuryRecord,
        current: &InjuryRecord,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: NotificationKind::StatusChange,
            player: current.player.clone(),
            team: current.team.clone(),
            old_status: Some(previous.status),
            new_status: Some(current.status),
            timestamp,
        }
    }

    pub fn key(&self) -> InjuryKey {
        InjuryKey {
            team: self.team.clone(),
            player: self.player.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> InjuryRecord {
        InjuryRecord {
            game: "LAL@BOS".to_string(),
            team: "Los Angeles Lakers".to_string(),
            player: "LeBron James".to_string(),
            status: InjuryStatus::Questionable,
            injury: "Left Ankle - Soreness".to_string(),
            last_update: None,
        }
    }

    #[test]
    fn test_status_from_str_ignores_case() {
        assert_eq!("out".parse::<InjuryStatus>(), Ok(InjuryStatus::Out));
        assert_eq!(
            " QUESTIONABLE ".parse::<InjuryStatus>(),
            Ok(InjuryStatus::Questionable)
        );
        assert!("Day-To-Day".parse::<InjuryStatus>().is_err());
    }

    #[test]
    fn test_notification_wire_format() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 15).unwrap();
        let notification = InjuryNotification::added(&sample_record(), ts);
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["type"], "added");
        assert_eq!(json["new_status"], "Questionable");
        assert!(json.get("old_status").is_none());
        assert_eq!(json["timestamp"], "2025-01-15T08:30:15Z");
    }

    #[test]
    fn test_status_change_carries_both_statuses() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 15).unwrap();
        let previous = InjuryRecord {
            status: InjuryStatus::Out,
            ..sample_record()
        };
        let notification = InjuryNotification::status_change(&previous, &sample_record(), ts);

        assert_eq!(notification.kind, NotificationKind::StatusChange);
        assert_eq!(notification.old_status, Some(InjuryStatus::Out));
        assert_eq!(notification.new_status, Some(InjuryStatus::Questionable));
        assert_eq!(notification.key(), sample_record().key());
    }
}
