//! Calendar rules in the ledger timezone.
//!
//! Timestamps are stored in UTC, but "today" and day windows are always
//! evaluated in the configured ledger timezone, never the host's.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::{EngineError, ResultEngine};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` date, reporting `code` when it is empty or malformed.
pub(crate) fn parse_date(value: &str, code: &'static str) -> ResultEngine<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::Validation(code));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| EngineError::Validation(code))
}

/// Like [`parse_date`], but an absent or empty value is `None`.
pub(crate) fn parse_optional_date(
    value: Option<&str>,
    code: &'static str,
) -> ResultEngine<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_date(value, code).map(Some),
        None => Ok(None),
    }
}

/// Calendar date of `now` in `tz`.
pub(crate) fn today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`, in UTC.
///
/// When midnight falls in a DST gap the first existing local time of the day
/// is used.
pub(crate) fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|hour| {
            let local = midnight + chrono::Duration::hours(hour);
            tz.from_local_datetime(&local).earliest()
        })
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Half-open UTC window `[from 00:00, to + 1 day 00:00)` in `tz`.
pub(crate) fn window(
    from: NaiveDate,
    to: NaiveDate,
    tz: Tz,
) -> ResultEngine<(DateTime<Utc>, DateTime<Utc>)> {
    let end = to
        .checked_add_days(Days::new(1))
        .ok_or(EngineError::Validation("invalid-end-date"))?;
    Ok((start_of_day(from, tz), start_of_day(end, tz)))
}

/// Timestamp stored for a new ledger row.
///
/// The requested instant (or `now`) is stored as is, backdated or not.
/// Sub-second precision is dropped.
pub(crate) fn resolve_occurred_at(
    requested: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let at = requested.unwrap_or(now);
    at.with_nanosecond(0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn parse_date_rejects_empty_and_malformed() {
        assert_eq!(
            parse_date("", "invalid-start-date"),
            Err(EngineError::Validation("invalid-start-date"))
        );
        assert_eq!(
            parse_date("2024/01/02", "invalid-end-date"),
            Err(EngineError::Validation("invalid-end-date"))
        );
        assert_eq!(
            parse_date("2024-01-02", "invalid-end-date"),
            Ok(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert_eq!(parse_optional_date(Some(" "), "invalid-start-date"), Ok(None));
    }

    #[test]
    fn same_day_instant_is_kept_without_subseconds() {
        let now = utc(2024, 3, 10, 15, 0);
        let at = utc(2024, 3, 10, 9, 30) + chrono::Duration::milliseconds(250);
        assert_eq!(resolve_occurred_at(Some(at), now), utc(2024, 3, 10, 9, 30));
        assert_eq!(resolve_occurred_at(None, now), now);
    }

    #[test]
    fn backdated_instant_is_kept_as_given() {
        let now = utc(2024, 3, 10, 15, 0);
        let at = utc(2024, 3, 8, 18, 45) + chrono::Duration::milliseconds(900);
        assert_eq!(resolve_occurred_at(Some(at), now), utc(2024, 3, 8, 18, 45));
    }

    #[test]
    fn today_follows_the_ledger_timezone() {
        // 23:30 UTC on the 9th is already the 10th in Jakarta (UTC+7).
        let at = utc(2024, 3, 9, 23, 30);
        assert_eq!(
            today(at, chrono_tz::Asia::Jakarta),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
        assert_eq!(today(at, Tz::UTC), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn window_covers_whole_local_days() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let (from, to) = window(day, day, chrono_tz::Asia::Jakarta).unwrap();
        assert_eq!(from, utc(2024, 3, 9, 17, 0));
        assert_eq!(to, utc(2024, 3, 10, 17, 0));
    }

    #[test]
    fn midnight_in_dst_gap_uses_first_valid_hour() {
        // Santiago skipped 00:00-01:00 on 2022-09-11.
        let day = NaiveDate::from_ymd_opt(2022, 9, 11).unwrap();
        let start = start_of_day(day, chrono_tz::America::Santiago);
        assert_eq!(start, utc(2022, 9, 11, 4, 0));
    }
}
