//! Conversions from the sources' local clock representations to UTC instants.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parses a `YYYYMMDD` date as used by GTFS calendars and GTFS-RT `start_date`.
pub fn parse_yyyymmdd(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

/// TransitMaster's `CALENDAR_ID` for a service date: `1YYYYMMDD`.
pub fn tm_calendar_id(service_date: NaiveDate) -> i64 {
    let ymd: i64 = service_date
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default();
    100_000_000 + ymd
}

/// Parses a GTFS `HH:MM:SS` time into seconds. Hours may exceed 23.
pub fn parse_gtfs_time(s: &str) -> Option<i64> {
    let mut parts = s.trim().split(':');
    let h: i64 = parts.next()?.parse().ok()?;
    let m: i64 = parts.next()?.parse().ok()?;
    let sec: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(0..60).contains(&m) || !(0..60).contains(&sec) || h < 0 {
        return None;
    }
    Some(h * 3600 + m * 60 + sec)
}

/// A GTFS schedule time: seconds measured from "noon minus 12h" local time on
/// the service date. On DST transition days this differs from local midnight,
/// so the offset is added to an absolute instant instead of a wall clock.
pub fn gtfs_seconds_to_utc(service_date: NaiveDate, seconds: i64, tz: Tz) -> Option<DateTime<Utc>> {
    let noon = service_date.and_time(NaiveTime::from_hms_opt(12, 0, 0)?);
    let noon = tz.from_local_datetime(&noon).earliest()?;
    Some((noon - Duration::hours(12) + Duration::seconds(seconds)).with_timezone(&Utc))
}

/// A TransitMaster time: seconds after local midnight on the wall clock,
/// possibly past 86 400 for trips running after midnight.
///
/// The repeated fall-back hour resolves to its earliest instant. A wall time
/// skipped by the spring-forward gap resolves one hour later.
pub fn local_seconds_to_utc(service_date: NaiveDate, seconds: i64, tz: Tz) -> Option<DateTime<Utc>> {
    let naive = service_date.and_time(NaiveTime::MIN) + Duration::seconds(seconds);
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())?;
    Some(local.with_timezone(&Utc))
}

/// Unix seconds to a UTC instant.
pub fn unix_to_utc(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}
