// src/utils/time.rs

//! Wall-clock helpers for the publisher's time zone.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Round `now` down to the most recent `interval_minutes` mark of the local hour.
pub fn floor_to_interval<T: TimeZone>(now: &DateTime<T>, interval_minutes: u32) -> DateTime<T> {
    let interval = interval_minutes.max(1);
    let into_interval = (now.minute() % interval) * 60 + now.second();
    now.clone()
        - Duration::seconds(i64::from(into_interval))
        - Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// Build the report URL for the slot that contains `now`.
///
/// `{date}` becomes `YYYY-MM-DD` and `{time}` becomes the 12-hour `HH_MMAM`
/// form used by the publisher, both in `tz`.
pub fn report_url(template: &str, now: DateTime<Utc>, tz: Tz, interval_minutes: u32) -> String {
    let slot = floor_to_interval(&now.with_timezone(&tz), interval_minutes);
    template
        .replace("{date}", &slot.format("%Y-%m-%d").to_string())
        .replace("{time}", &slot.format("%I_%M%p").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://example.com/Injury-Report_{date}_{time}.pdf";

    #[test]
    fn test_floor_to_interval() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 8, 44, 59).unwrap();
        let floored = floor_to_interval(&now, 15);
        assert_eq!(floored, Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_floor_on_mark_is_identity() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 8, 45, 0).unwrap();
        assert_eq!(floor_to_interval(&now, 15), now);
    }

    #[test]
    fn test_report_url_uses_new_york_time() {
        // 08:37 UTC in January is 03:37 EST.
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 8, 37, 12).unwrap();
        let url = report_url(TEMPLATE, now, chrono_tz::America::New_York, 15);
        assert_eq!(
            url,
            "https://example.com/Injury-Report_2025-01-15_03_30AM.pdf"
        );
    }

    #[test]
    fn test_report_url_afternoon_and_dst() {
        // 21:05 UTC in July is 17:05 EDT.
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 21, 5, 0).unwrap();
        let url = report_url(TEMPLATE, now, chrono_tz::America::New_York, 15);
        assert_eq!(
            url,
            "https://example.com/Injury-Report_2025-07-01_05_00PM.pdf"
        );
    }

    #[test]
    fn test_report_url_crosses_local_midnight() {
        // 04:10 UTC on Jan 16 is still 23:10 EST on Jan 15.
        let now = Utc.with_ymd_and_hms(2025, 1, 16, 4, 10, 0).unwrap();
        let url = report_url(TEMPLATE, now, chrono_tz::America::New_York, 15);
        assert_eq!(
            url,
            "https://example.com/Injury-Report_2025-01-15_11_00PM.pdf"
        );
    }
}
