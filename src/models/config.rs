//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Column;

/// Upper bound for `retention.ttl_hours` (one year).
pub const MAX_TTL_HOURS: u32 = 24 * 366;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Report download settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Polling cadence
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Store and history retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Column x-ranges of the report table
    #[serde(default)]
    pub layout: ColumnLayout,

    /// Checks applied before a parsed report replaces the store
    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if !self.fetcher.url_template.contains("{date}")
            || !self.fetcher.url_template.contains("{time}")
        {
            return Err(AppError::validation(
                "fetcher.url_template must contain {date} and {time}",
            ));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.max_attempts == 0 {
            return Err(AppError::validation("fetcher.max_attempts must be > 0"));
        }
        if self.schedule.interval_minutes == 0 || 60 % self.schedule.interval_minutes != 0 {
            return Err(AppError::validation(
                "schedule.interval_minutes must divide 60",
            ));
        }
        if self.schedule.offset_secs >= u64::from(self.schedule.interval_minutes) * 60 {
            return Err(AppError::validation(
                "schedule.offset_secs must be shorter than the interval",
            ));
        }
        self.schedule.tz()?;
        if self.retention.ttl_hours == 0 || self.retention.ttl_hours > MAX_TTL_HOURS {
            return Err(AppError::validation(format!(
                "retention.ttl_hours must be within 1-{MAX_TTL_HOURS}"
            )));
        }
        if self.retention.max_history == 0 {
            return Err(AppError::validation("retention.max_history must be > 0"));
        }
        if self.server.heartbeat_secs == 0 {
            return Err(AppError::validation("server.heartbeat_secs must be > 0"));
        }
        self.layout.validate()?;
        if let Some(percent) = self.guard.max_drop_percent {
            if percent > 100 {
                return Err(AppError::validation(
                    "guard.max_drop_percent must be within 0-100",
                ));
            }
        }
        Ok(())
    }
}

/// Report download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Report URL with `{date}` (YYYY-MM-DD) and `{time}` (HH_MMAM) placeholders
    #[serde(default = "defaults::url_template")]
    pub url_template: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-attempt request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Total number of attempts per cycle
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_secs: u64,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            url_template: defaults::url_template(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            retry_delay_secs: defaults::retry_delay(),
        }
    }
}

/// Polling cadence, aligned to the publisher's wall clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// IANA zone the publisher works in
    #[serde(default = "defaults::timezone")]
    pub timezone: String,

    /// Minutes between publication marks
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: u32,

    /// Seconds past each mark to wait before polling
    #[serde(default = "defaults::offset_secs")]
    pub offset_secs: u64,
}

impl ScheduleConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AppError::config(format!("invalid timezone '{}': {e}", self.timezone)))
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: defaults::timezone(),
            interval_minutes: defaults::interval_minutes(),
            offset_secs: defaults::offset_secs(),
        }
    }
}

/// Store and history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age after which history entries and stale records are dropped
    #[serde(default = "defaults::ttl_hours")]
    pub ttl_hours: u32,

    /// Maximum number of notifications kept in history
    #[serde(default = "defaults::max_history")]
    pub max_history: usize,
}

impl RetentionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.ttl_hours))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: defaults::ttl_hours(),
            max_history: defaults::max_history(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::bind")]
    pub bind: String,

    /// Idle interval after which the stream sends a keep-alive
    #[serde(default = "defaults::heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            heartbeat_secs: defaults::heartbeat_secs(),
        }
    }
}

/// Horizontal extent `[start, end)` of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: f32,
    pub end: f32,
}

impl Span {
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, x: f32) -> bool {
        x >= self.start && x < self.end
    }
}

/// Column x-ranges of the report table, in PDF points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnLayout {
    #[serde(default = "defaults::date_span")]
    pub date: Span,
    #[serde(default = "defaults::time_span")]
    pub time: Span,
    #[serde(default = "defaults::matchup_span")]
    pub matchup: Span,
    #[serde(default = "defaults::team_span")]
    pub team: Span,
    #[serde(default = "defaults::player_span")]
    pub player: Span,
    #[serde(default = "defaults::status_span")]
    pub status: Span,
    #[serde(default = "defaults::reason_span")]
    pub reason: Span,
}

impl ColumnLayout {
    fn spans(&self) -> [(Column, Span); 7] {
        [
            (Column::Date, self.date),
            (Column::Time, self.time),
            (Column::Matchup, self.matchup),
            (Column::Team, self.team),
            (Column::Player, self.player),
            (Column::Status, self.status),
            (Column::Reason, self.reason),
        ]
    }

    /// Column whose range contains `x`, if any.
    pub fn classify(&self, x: f32) -> Option<Column> {
        self.spans()
            .into_iter()
            .find(|(_, span)| span.contains(x))
            .map(|(column, _)| column)
    }

    pub fn validate(&self) -> Result<()> {
        let spans = self.spans();
        for (column, span) in &spans {
            if span.start >= span.end {
                return Err(AppError::validation(format!(
                    "layout span for {column:?} is empty"
                )));
            }
        }
        for pair in spans.windows(2) {
            if pair[0].1.end > pair[1].1.start {
                return Err(AppError::validation(format!(
                    "layout spans for {:?} and {:?} overlap",
                    pair[0].0, pair[1].0
                )));
            }
        }
        Ok(())
    }
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            date: defaults::date_span(),
            time: defaults::time_span(),
            matchup: defaults::matchup_span(),
            team: defaults::team_span(),
            player: defaults::player_span(),
            status: defaults::status_span(),
            reason: defaults::reason_span(),
        }
    }
}

/// Checks applied before a parsed report replaces the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Reject a report whose record count drops by more than this percentage.
    /// Disabled when unset.
    #[serde(default)]
    pub max_drop_percent: Option<u8>,

    /// Below this many stored records the drop check is skipped
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: None,
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use super::Span;

    // Fetcher defaults
    pub fn url_template() -> String {
        "https://ak-static.cms.nba.com/referee/injury/Injury-Report_{date}_{time}.pdf".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; injury-report/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        5
    }

    // Schedule defaults
    pub fn timezone() -> String {
        "America/New_York".into()
    }
    pub fn interval_minutes() -> u32 {
        15
    }
    pub fn offset_secs() -> u64 {
        15
    }

    // Retention defaults
    pub fn ttl_hours() -> u32 {
        48
    }
    pub fn max_history() -> usize {
        150
    }

    // Server defaults
    pub fn bind() -> String {
        "0.0.0.0:8000".into()
    }
    pub fn heartbeat_secs() -> u64 {
        30
    }

    // Layout defaults (landscape letter, 792pt wide)
    pub fn date_span() -> Span {
        Span::new(0.0, 95.0)
    }
    pub fn time_span() -> Span {
        Span::new(95.0, 160.0)
    }
    pub fn matchup_span() -> Span {
        Span::new(160.0, 230.0)
    }
    pub fn team_span() -> Span {
        Span::new(230.0, 390.0)
    }
    pub fn player_span() -> Span {
        Span::new(390.0, 540.0)
    }
    pub fn status_span() -> Span {
        Span::new(540.0, 620.0)
    }
    pub fn reason_span() -> Span {
        Span::new(620.0, 792.0)
    }

    // Guard defaults
    pub fn min_baseline() -> usize {
        10
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
