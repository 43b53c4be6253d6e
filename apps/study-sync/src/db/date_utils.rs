//! Date utilities for daily reset hour handling.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Timelike, Utc};

/// Get adjusted "today" based on daily_reset_hour.
///
/// If the current hour is before the reset hour, "today" is actually "yesterday"
/// from a study perspective, so late-night sessions count towards the previous day.
pub fn adjusted_today(daily_reset_hour: u32, now: DateTime<Local>) -> NaiveDate {
    if now.hour() < daily_reset_hour {
        (now - Duration::days(1)).date_naive()
    } else {
        now.date_naive()
    }
}

/// Instant the current study day ends: the next reset hour, in UTC.
///
/// Items due before this instant belong in today's queue.
pub fn study_day_end(daily_reset_hour: u32, now: DateTime<Local>) -> DateTime<Utc> {
    let next_day = adjusted_today(daily_reset_hour, now) + Duration::days(1);
    let reset = NaiveTime::from_hms_opt(daily_reset_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    Local
        .from_local_datetime(&next_day.and_time(reset))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc) + Duration::days(1))
}

/// Canonical timestamp text stored in the database.
///
/// Fixed precision keeps lexical and chronological order identical.
pub fn to_db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_db_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).earliest().unwrap()
    }

    #[test]
    fn test_midnight_reset() {
        let now = local(2026, 6, 15, 2);
        assert_eq!(adjusted_today(0, now), NaiveDate::from_ymd_opt(2026, 6, 15).unwrap());
    }

    #[test]
    fn test_before_reset_hour_counts_as_yesterday() {
        let now = local(2026, 6, 15, 2);
        assert_eq!(adjusted_today(4, now), NaiveDate::from_ymd_opt(2026, 6, 14).unwrap());
    }

    #[test]
    fn test_study_day_end() {
        let end = study_day_end(0, local(2026, 6, 15, 10));
        assert_eq!(end, local(2026, 6, 16, 0).with_timezone(&Utc));

        // Before the reset hour the day ends at today's reset.
        let end = study_day_end(4, local(2026, 6, 15, 2));
        assert_eq!(end, local(2026, 6, 15, 4).with_timezone(&Utc));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let text = to_db_timestamp(&at);
        assert_eq!(text, "2026-01-02T03:04:05.000000Z");
        assert_eq!(parse_db_timestamp(&text), Some(at));
        assert_eq!(parse_db_timestamp("yesterday"), None);
    }
}
