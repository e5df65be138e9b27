//! Account-local date helpers.
//!
//! Every calendar comparison in the engine goes through these functions so
//! that "today", due dates, and paydays are all evaluated in the account's
//! zone. Stored dates are plain calendar days in that zone; instants are UTC
//! until they are converted here.

use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Parses an IANA zone name such as `"America/New_York"`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| Error::invalid_state(format!("unknown time zone {name:?}: {e}")))
}

/// Midnight at the start of `date` in `tz`.
///
/// Zones that skip midnight on a DST transition get the earliest valid local
/// time of that day instead.
#[must_use]
pub fn date_midnight(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let mut naive = date.and_time(chrono::NaiveTime::MIN);
    loop {
        if let Some(local) = tz.from_local_datetime(&naive).earliest() {
            return local;
        }
        naive += chrono::Duration::minutes(30);
    }
}

/// Midnight of the local day containing `instant`.
#[must_use]
pub fn midnight_in_local(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    date_midnight(local_today(instant, tz), tz)
}

/// The calendar day `instant` falls on in `tz`.
#[must_use]
pub fn local_today(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Parses a feed date (`YYYY-MM-DD`).
///
/// Feed dates already name a local calendar day, so they are kept as a day and
/// never routed through UTC.
pub fn parse_feed_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| Error::invalid_state(format!("invalid feed date {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_local_today_west_of_utc() {
        // 03:00 UTC on the 5th is still the evening of the 4th in Los Angeles.
        let instant = Utc.with_ymd_and_hms(2022, 4, 5, 3, 0, 0).unwrap();
        let tz = parse_timezone("America/Los_Angeles").unwrap();
        assert_eq!(
            local_today(instant, tz),
            NaiveDate::from_ymd_opt(2022, 4, 4).unwrap()
        );
        assert_eq!(
            local_today(instant, chrono_tz::UTC),
            NaiveDate::from_ymd_opt(2022, 4, 5).unwrap()
        );
    }

    #[test]
    fn test_midnight_in_local() {
        let instant = Utc.with_ymd_and_hms(2022, 4, 5, 18, 30, 0).unwrap();
        let tz = parse_timezone("America/Chicago").unwrap();
        let midnight = midnight_in_local(instant, tz);
        assert_eq!(midnight.hour(), 0);
        assert_eq!(midnight.minute(), 0);
        assert_eq!(
            midnight.date_naive(),
            NaiveDate::from_ymd_opt(2022, 4, 5).unwrap()
        );
    }

    #[test]
    fn test_date_midnight_skipped_by_dst() {
        // Havana springs forward at midnight; 00:00 does not exist that day.
        let tz = parse_timezone("America/Havana").unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 3, 13).unwrap();
        let start = date_midnight(date, tz);
        assert_eq!(start.date_naive(), date);
        assert_eq!(start.hour(), 1);
    }

    #[test]
    fn test_parse_timezone_rejects_unknown() {
        let result = parse_timezone("Mars/Olympus_Mons");
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_parse_feed_date() {
        assert_eq!(
            parse_feed_date("2022-04-15").unwrap(),
            NaiveDate::from_ymd_opt(2022, 4, 15).unwrap()
        );
        assert!(parse_feed_date("04/15/2022").is_err());
    }
}
