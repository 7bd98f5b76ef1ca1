// src/pipeline/service.rs

//! The long-lived injury service.
//!
//! Owns the fetcher, parser, guard, store and hub, and runs one polling cycle
//! at a time: fetch, parse, guard, diff, store update, broadcast.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{Config, InjuryNotification, InjuryRecord, InjuryStatus};
use crate::pipeline::circuit_breaker::{GuardResult, RunGuard};
use crate::pipeline::diff::diff;
use crate::pipeline::hub::{NotificationHub, Subscription};
use crate::pipeline::store::InjuryStore;
use crate::services::{FetchOutcome, HttpReportSource, PdfFetcher, ReportParser, ReportSource};
use crate::utils::time::report_url;

/// Stage of a polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    Fetching,
    Parsing,
    Diffing,
    StoreUpdating,
    Broadcasting,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Diffing => "diffing",
            Self::StoreUpdating => "updating store",
            Self::Broadcasting => "broadcasting",
        };
        f.write_str(name)
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The slot's report is not posted yet
    NotPublished,
    /// The source kept failing
    Unavailable { attempts: u32 },
    /// The parsed batch was not applied
    Rejected(GuardResult),
    /// The batch replaced the store
    Applied {
        records: usize,
        notifications: usize,
    },
}

impl CycleOutcome {
    /// Last stage the cycle reached.
    pub fn stage(&self) -> CycleStage {
        match self {
            Self::NotPublished | Self::Unavailable { .. } => CycleStage::Fetching,
            Self::Rejected(_) => CycleStage::Parsing,
            Self::Applied { notifications: 0, .. } => CycleStage::StoreUpdating,
            Self::Applied { .. } => CycleStage::Broadcasting,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Result of the fetch and parse stages.
enum Fetched {
    Records(Vec<InjuryRecord>),
    Skipped(CycleOutcome),
}

#[derive(Debug, Default)]
struct StoreState {
    store: InjuryStore,
    /// Time of the last batch that replaced the store
    last_refresh: Option<DateTime<Utc>>,
}

/// Injury report service shared by the scheduler and the HTTP handlers.
pub struct InjuryService<S = HttpReportSource> {
    fetcher: PdfFetcher<S>,
    parser: ReportParser,
    guard: RunGuard,
    hub: NotificationHub,
    state: RwLock<StoreState>,
    url_template: String,
    tz: Tz,
    interval_minutes: u32,
    ttl: Duration,
}

impl InjuryService<HttpReportSource> {
    /// Build a service that fetches over HTTP.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_source(HttpReportSource::new(&config.fetcher)?, config)
    }
}

impl<S: ReportSource> InjuryService<S> {
    pub fn with_source(source: S, config: &Config) -> Result<Self> {
        let tz = config.schedule.tz()?;
        Ok(Self {
            fetcher: PdfFetcher::new(source, &config.fetcher),
            parser: ReportParser::new(config.layout.clone(), tz),
            guard: RunGuard::new(config.guard.clone()),
            hub: NotificationHub::new(&config.retention),
            state: RwLock::new(StoreState::default()),
            url_template: config.fetcher.url_template.clone(),
            tz,
            interval_minutes: config.schedule.interval_minutes,
            ttl: config.retention.ttl(),
        })
    }

    /// Report URL for the slot containing `now`.
    pub fn report_url(&self, now: DateTime<Utc>) -> String {
        report_url(&self.url_template, now, self.tz, self.interval_minutes)
    }

    /// Fill the store once at startup, without notifications.
    pub async fn initialize(&self) -> Result<CycleOutcome> {
        self.initialize_at(Utc::now()).await
    }

    pub async fn initialize_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        log::info!("Initializing injury store");

        let records = match self.fetch_and_parse(now).await? {
            Fetched::Records(records) => records,
            Fetched::Skipped(outcome) => {
                log::warn!("Starting with an empty injury store ({:?})", outcome);
                return Ok(outcome);
            }
        };

        let verdict = self.guard.evaluate(&records, 0);
        if !verdict.is_safe() {
            log::warn!("Starting with an empty injury store, initial report had no records");
            return Ok(CycleOutcome::Rejected(verdict));
        }

        let mut state = self.state.write().await;
        state.store.populate(records, now);
        state.last_refresh = Some(now);
        log::info!("Injury store initialized with {} player(s)", state.store.len());

        Ok(CycleOutcome::Applied {
            records: state.store.len(),
            notifications: 0,
        })
    }

    /// Run one polling cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let records = match self.fetch_and_parse(now).await? {
            Fetched::Records(records) => records,
            Fetched::Skipped(outcome) => {
                log::warn!("Keeping current injury data ({:?})", outcome);
                self.expire_if_stale(now).await;
                return Ok(outcome);
            }
        };

        let (notifications, stored) = {
            let mut state = self.state.write().await;

            let verdict = self.guard.evaluate(&records, state.store.len());
            if !verdict.is_safe() {
                drop(state);
                self.expire_if_stale(now).await;
                return Ok(CycleOutcome::Rejected(verdict));
            }

            log::debug!("[{}] {} record(s) against {}", CycleStage::Diffing, records.len(), state.store.len());
            let notifications = diff(&state.store, &records, now);

            log::debug!("[{}]", CycleStage::StoreUpdating);
            state.store.replace(records, &notifications, now);
            state.last_refresh = Some(now);
            (notifications, state.store.len())
        };

        if !notifications.is_empty() {
            log::info!(
                "[{}] {} injury update(s)",
                CycleStage::Broadcasting,
                notifications.len()
            );
            self.hub.broadcast(&notifications, now).await;
        }

        let outcome = CycleOutcome::Applied {
            records: stored,
            notifications: notifications.len(),
        };
        log::info!(
            "Cycle complete: {} player(s), {} change(s)",
            stored,
            notifications.len()
        );
        Ok(outcome)
    }

    async fn fetch_and_parse(&self, now: DateTime<Utc>) -> Result<Fetched> {
        let url = self.report_url(now);
        log::info!("[{}] {}", CycleStage::Fetching, url);

        let bytes = match self.fetcher.fetch(&url).await {
            FetchOutcome::Document(bytes) => bytes,
            FetchOutcome::NotPublished => return Ok(Fetched::Skipped(CycleOutcome::NotPublished)),
            FetchOutcome::Unavailable { attempts } => {
                return Ok(Fetched::Skipped(CycleOutcome::Unavailable { attempts }));
            }
        };

        log::debug!("[{}] {} byte(s)", CycleStage::Parsing, bytes.len());
        let parser = self.parser.clone();
        let records = tokio::task::spawn_blocking(move || parser.parse(&bytes))
            .await
            .map_err(|e| AppError::cycle(CycleStage::Parsing, e))?;
        log::info!("Parsed {} injury record(s)", records.len());

        Ok(Fetched::Records(records))
    }

    /// Age out the store when no batch has been applied within the TTL.
    async fn expire_if_stale(&self, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        let stale = state
            .last_refresh
            .is_some_and(|refreshed| now - refreshed > self.ttl);
        if stale {
            let removed = state.store.sweep(now, self.ttl);
            if removed > 0 {
                log::warn!("Dropped {} stale injury record(s)", removed);
            }
        }
    }

    /// Snapshot of the current records in report order.
    pub async fn records(&self) -> Vec<InjuryRecord> {
        self.state.read().await.store.records().to_vec()
    }

    pub async fn record_count(&self) -> usize {
        self.state.read().await.store.len()
    }

    /// Notification history, newest first.
    pub async fn history(&self) -> Vec<InjuryNotification> {
        self.hub.history(Utc::now()).await
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Broadcast a synthetic notification to check the live stream.
    pub async fn test_notification(&self) -> InjuryNotification {
        self.test_notification_at(Utc::now()).await
    }

    pub async fn test_notification_at(&self, now: DateTime<Utc>) -> InjuryNotification {
        let notification = {
            let state = self.state.read().await;
            match state.store.records().first() {
                Some(record) => InjuryNotification::status_change(record, record, now),
                None => InjuryNotification::added(
                    &InjuryRecord {
                        game: String::new(),
                        team: "Test Team".into(),
                        player: "Test Player".into(),
                        status: InjuryStatus::Out,
                        injury: String::new(),
                        last_update: None,
                    },
                    now,
                ),
            }
        };

        self.hub.broadcast(std::slice::from_ref(&notification), now).await;
        notification
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::models::{InjuryKey, NotificationKind};
    use crate::services::SourceResponse;
    use crate::services::pdf::render_test_document;

    const TEAM_X: f32 = 240.0;
    const PLAYER_X: f32 = 400.0;
    const STATUS_X: f32 = 545.0;
    const REASON_X: f32 = 625.0;

    /// Serves whatever document is currently set; 404 when none is.
    #[derive(Default)]
    struct SwitchableSource {
        current: Mutex<Option<SourceResponse>>,
    }

    impl SwitchableSource {
        fn set(&self, status: u16, body: Vec<u8>) {
            *self.current.lock().unwrap() = Some(SourceResponse { status, body });
        }
    }

    #[async_trait]
    impl ReportSource for SwitchableSource {
        async fn get(&self, _url: &str) -> Result<SourceResponse> {
            Ok(self.current.lock().unwrap().clone().unwrap_or(SourceResponse {
                status: 404,
                body: Vec::new(),
            }))
        }
    }

    type Row<'a> = (&'a str, &'a str, &'a str, &'a str);

    fn report(rows: &[Row<'_>]) -> Vec<u8> {
        let mut page = vec![("Injury Report: 01/15/25 03:30 PM", 300.0, 20.0)];
        for (i, (team, player, status, reason)) in rows.iter().enumerate() {
            let y = 60.0 + 12.0 * i as f32;
            page.push((*team, TEAM_X, y));
            page.push((*player, PLAYER_X, y));
            page.push((*status, STATUS_X, y));
            page.push((*reason, REASON_X, y));
        }
        render_test_document(&[page])
    }

    fn service() -> InjuryService<SwitchableSource> {
        InjuryService::with_source(SwitchableSource::default(), &Config::default()).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap() + Duration::hours(i64::from(hour))
    }

    const LAKERS: &str = "LosAngelesLakers";

    #[tokio::test]
    async fn test_initialize_populates_without_notifications() {
        let service = service();
        let mut sub = service.subscribe();
        service.fetcher.source().set(
            200,
            report(&[(LAKERS, "James, LeBron", "Questionable", "Injury/Illness-LeftAnkle;Soreness")]),
        );

        let outcome = service.initialize_at(at(1)).await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Applied {
                records: 1,
                notifications: 0
            }
        );
        let records = service.records().await;
        assert_eq!(records[0].player, "LeBron James");
        assert_eq!(records[0].team, "Los Angeles Lakers");
        assert_eq!(records[0].injury, "Left Ankle - Soreness");
        assert_eq!(records[0].last_update, Some(at(1)));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_status_change_cycle() {
        let service = service();
        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Questionable", "Rest")]));
        service.initialize_at(at(1)).await.unwrap();
        let mut sub = service.subscribe();

        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Out", "Rest")]));
        let outcome = service.run_cycle_at(at(2)).await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Applied {
                records: 1,
                notifications: 1
            }
        );
        assert_eq!(outcome.stage(), CycleStage::Broadcasting);
        let pushed = sub.recv().await.unwrap();
        assert_eq!(pushed.kind, NotificationKind::StatusChange);
        assert_eq!(pushed.old_status, Some(InjuryStatus::Questionable));
        assert_eq!(pushed.new_status, Some(InjuryStatus::Out));
        assert_eq!(service.records().await[0].last_update, Some(at(2)));
        assert_eq!(service.hub.history(at(2)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_cycle_keeps_timestamps() {
        let service = service();
        let rows = [(LAKERS, "James, LeBron", "Out", "Rest")];
        service.fetcher.source().set(200, report(&rows));
        service.initialize_at(at(1)).await.unwrap();

        let outcome = service.run_cycle_at(at(2)).await.unwrap();

        assert_eq!(outcome.stage(), CycleStage::StoreUpdating);
        assert_eq!(service.records().await[0].last_update, Some(at(1)));
        assert!(service.hub.history(at(2)).await.is_empty());
    }

    #[tokio::test]
    async fn test_removal_only_for_reported_team() {
        let service = service();
        service.fetcher.source().set(
            200,
            report(&[
                (LAKERS, "James, LeBron", "Out", "Rest"),
                (LAKERS, "Davis, Anthony", "Out", "Rest"),
                ("BostonCeltics", "Tatum, Jayson", "Probable", "Rest"),
            ]),
        );
        service.initialize_at(at(1)).await.unwrap();

        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Out", "Rest")]));
        service.run_cycle_at(at(2)).await.unwrap();

        let history = service.hub.history(at(2)).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, NotificationKind::Removed);
        assert_eq!(history[0].player, "Anthony Davis");
        assert_eq!(service.record_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_published_keeps_store() {
        let service = service();
        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Out", "Rest")]));
        service.initialize_at(at(1)).await.unwrap();

        service.fetcher.source().set(404, Vec::new());
        let outcome = service.run_cycle_at(at(2)).await.unwrap();

        assert_eq!(outcome, CycleOutcome::NotPublished);
        assert_eq!(service.record_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_source_keeps_store() {
        let service = service();
        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Out", "Rest")]));
        service.initialize_at(at(1)).await.unwrap();

        service.fetcher.source().set(503, Vec::new());
        let outcome = service.run_cycle_at(at(2)).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Unavailable { attempts: 3 });
        assert_eq!(outcome.stage(), CycleStage::Fetching);
        assert_eq!(service.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_unreadable_report_is_rejected() {
        let service = service();
        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Out", "Rest")]));
        service.initialize_at(at(1)).await.unwrap();

        service.fetcher.source().set(200, b"<html>maintenance</html>".to_vec());
        let outcome = service.run_cycle_at(at(2)).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Rejected(GuardResult::EmptyResult));
        assert!(!outcome.is_applied());
        assert_eq!(service.record_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_expires_after_ttl_without_refresh() {
        let service = service();
        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Out", "Rest")]));
        service.initialize_at(at(1)).await.unwrap();

        service.fetcher.source().set(404, Vec::new());
        service.run_cycle_at(at(30)).await.unwrap();
        assert_eq!(service.record_count().await, 1);

        service.run_cycle_at(at(50)).await.unwrap();
        assert_eq!(service.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_notification_on_empty_store() {
        let service = service();
        let mut sub = service.subscribe();

        let notification = service.test_notification_at(at(1)).await;

        assert_eq!(notification.kind, NotificationKind::Added);
        assert_eq!(notification.player, "Test Player");
        assert_eq!(notification.team, "Test Team");
        assert_eq!(notification.new_status, Some(InjuryStatus::Out));
        assert_eq!(sub.recv().await.unwrap(), notification);
    }

    #[tokio::test]
    async fn test_notification_uses_first_record() {
        let service = service();
        service
            .fetcher
            .source()
            .set(200, report(&[(LAKERS, "James, LeBron", "Doubtful", "Rest")]));
        service.initialize_at(at(1)).await.unwrap();

        let notification = service.test_notification_at(at(2)).await;

        assert_eq!(notification.kind, NotificationKind::StatusChange);
        assert_eq!(notification.key(), InjuryKey::new("Los Angeles Lakers", "LeBron James"));
        assert_eq!(notification.old_status, Some(InjuryStatus::Doubtful));
        assert_eq!(notification.new_status, Some(InjuryStatus::Doubtful));
        assert_eq!(service.hub.history(at(2)).await.len(), 1);
    }

    #[test]
    fn test_report_url_from_config() {
        let service = service();
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 20, 31, 0).unwrap();
        assert_eq!(
            service.report_url(now),
            "https://ak-static.cms.nba.com/referee/injury/Injury-Report_2025-01-15_03_30PM.pdf"
        );
    }
}
