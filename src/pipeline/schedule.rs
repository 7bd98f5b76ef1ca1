// src/pipeline/schedule.rs

//! Wall-clock aligned polling.
//!
//! The publisher posts a new report every 15 minutes of New York time. Cycles
//! run shortly after each mark so the file is usually there on the first try.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::error::Result;
use crate::models::ScheduleConfig;
use crate::pipeline::service::{CycleStage, InjuryService};
use crate::services::ReportSource;
use crate::utils::time::floor_to_interval;

/// Next instant strictly after `now` that sits `offset_secs` past an
/// `interval_minutes` mark of the local hour in `tz`.
pub fn next_trigger(
    now: DateTime<Utc>,
    tz: Tz,
    interval_minutes: u32,
    offset_secs: u64,
) -> DateTime<Utc> {
    let interval = Duration::minutes(i64::from(interval_minutes.max(1)));
    let offset = Duration::seconds(offset_secs.min(86_400) as i64);

    let local = now.with_timezone(&tz);
    let mut mark = floor_to_interval(&local, interval_minutes);
    loop {
        let candidate = mark.clone() + offset;
        if candidate > local {
            return candidate.with_timezone(&Utc);
        }
        // Re-floor so marks restart at the top of each hour.
        mark = floor_to_interval(&(mark + interval), interval_minutes);
    }
}

/// Drive polling cycles forever.
///
/// Each cycle runs on its own task. A failed or panicking cycle is logged and
/// the loop carries on with the next trigger.
pub async fn run<S: ReportSource + 'static>(
    service: Arc<InjuryService<S>>,
    config: ScheduleConfig,
) -> Result<()> {
    let tz = config.tz()?;
    log::info!(
        "Scheduler started: every {} min + {}s ({})",
        config.interval_minutes,
        config.offset_secs,
        tz
    );

    loop {
        let now = Utc::now();
        let trigger = next_trigger(now, tz, config.interval_minutes, config.offset_secs);
        let wait = (trigger - now).to_std().unwrap_or_default();
        log::debug!(
            "[{}] next cycle at {} (in {:.1}s)",
            CycleStage::Idle,
            trigger.with_timezone(&tz),
            wait.as_secs_f64()
        );
        tokio::time::sleep(wait).await;

        let cycle = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.run_cycle().await }
        });
        match cycle.await {
            Ok(Ok(outcome)) => log::debug!("Cycle ended at stage '{}'", outcome.stage()),
            Ok(Err(e)) => log::error!("Injury update cycle error: {}", e),
            Err(e) => log::error!("Injury update cycle aborted: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    use super::*;
    use crate::models::Config;
    use crate::services::SourceResponse;

    /// Panics on the first request, then reports nothing published.
    struct PanicOnceSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ReportSource for PanicOnceSource {
        async fn get(&self, _url: &str) -> Result<SourceResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("source blew up");
            }
            Ok(SourceResponse {
                status: 404,
                body: Vec::new(),
            })
        }
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        // January: New York is UTC-5.
        Utc.with_ymd_and_hms(2025, 1, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_next_trigger_within_interval() {
        assert_eq!(next_trigger(utc(15, 3, 0), New_York, 15, 15), utc(15, 15, 15));
    }

    #[test]
    fn test_next_trigger_before_offset() {
        assert_eq!(next_trigger(utc(15, 15, 5), New_York, 15, 15), utc(15, 15, 15));
    }

    #[test]
    fn test_next_trigger_is_strictly_after_now() {
        assert_eq!(next_trigger(utc(15, 15, 15), New_York, 15, 15), utc(15, 30, 15));
    }

    #[test]
    fn test_next_trigger_across_hour() {
        assert_eq!(next_trigger(utc(15, 50, 0), New_York, 15, 15), utc(16, 0, 15));
    }

    #[test]
    fn test_next_trigger_uneven_interval_restarts_each_hour() {
        // Marks at :00, :25, :50 of every hour.
        assert_eq!(next_trigger(utc(15, 55, 0), New_York, 25, 0), utc(16, 0, 0));
        assert_eq!(next_trigger(utc(15, 30, 0), New_York, 25, 0), utc(15, 50, 0));
    }

    #[test]
    fn test_next_trigger_half_hour_zone() {
        let tz: Tz = "Asia/Kolkata".parse().unwrap();
        // 15:50 UTC is 21:20 IST; the next quarter mark is 21:30 IST.
        assert_eq!(next_trigger(utc(15, 50, 0), tz, 15, 15), utc(16, 0, 15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_panicking_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = PanicOnceSource {
            calls: Arc::clone(&calls),
        };
        let service = Arc::new(InjuryService::with_source(source, &Config::default()).unwrap());
        let scheduler = tokio::spawn(run(service, ScheduleConfig::default()));

        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;

        assert!(!scheduler.is_finished());
        assert!(calls.load(Ordering::SeqCst) >= 2);
        scheduler.abort();
    }
}
