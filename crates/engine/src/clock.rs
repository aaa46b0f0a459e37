//! Civil timezone normalization.
//!
//! The till runs in Buenos Aires. Dates typed by operators are wall-clock
//! values in that zone; they are converted to absolute instants before being
//! stored, and calendar windows ("today", "this month") are evaluated there
//! too, whatever the host timezone is.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The fixed civil timezone of the nursery.
pub const CIVIL_TZ: Tz = chrono_tz::America::Argentina::Buenos_Aires;

const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Resolves the date field of a movement form into an absolute instant.
///
/// - `YYYY-MM-DD` is local midnight in [`CIVIL_TZ`];
/// - `YYYY-MM-DDTHH:MM[:SS]` is a wall-clock time in [`CIVIL_TZ`];
/// - an RFC 3339 string carries its own offset and is taken as is;
/// - anything else falls back to `now`.
#[must_use]
pub fn resolve_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(parse_civil)
        .unwrap_or(now)
}

fn parse_civil(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return civil_to_utc(date.and_hms_opt(0, 0, 0)?);
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return civil_to_utc(naive);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn civil_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    CIVIL_TZ
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Calendar date of `instant` in the civil timezone.
#[must_use]
pub fn civil_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&CIVIL_TZ).date_naive()
}

#[must_use]
pub fn same_civil_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    civil_date(a) == civil_date(b)
}

#[must_use]
pub fn same_civil_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    let (a, b) = (civil_date(a), civil_date(b));
    a.year() == b.year() && a.month() == b.month()
}
