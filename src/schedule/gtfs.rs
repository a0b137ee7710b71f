//! Builds the GTFS planned stop visits for one service date.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::types::{GtfsCalendar, GtfsCalendarDate, GtfsRoute, GtfsScheduleStop, GtfsStaticTables};
use crate::fill::min_present;
use crate::time::{gtfs_seconds_to_utc, parse_gtfs_time, parse_yyyymmdd};
use crate::trip_id::canonical_trip_id;

/// GTFS `route_type` for buses.
pub const BUS_ROUTE_TYPE: u16 = 3;

/// Route ids of every bus route in the feed.
pub fn bus_route_ids(routes: &[GtfsRoute]) -> BTreeSet<String> {
    routes
        .iter()
        .filter(|r| r.route_type == BUS_ROUTE_TYPE)
        .map(|r| r.route_id.clone())
        .collect()
}

/// Service ids running on `service_date`: the weekly calendar within its date
/// range, then `calendar_dates` exceptions (1 adds, 2 removes).
pub fn active_service_ids(
    service_date: NaiveDate,
    calendar: &[GtfsCalendar],
    calendar_dates: &[GtfsCalendarDate],
) -> BTreeSet<String> {
    let mut active: BTreeSet<String> = calendar
        .iter()
        .filter(|c| runs_on(c, service_date))
        .map(|c| c.service_id.clone())
        .collect();

    for exception in calendar_dates {
        if parse_yyyymmdd(&exception.date) != Some(service_date) {
            continue;
        }
        match exception.exception_type {
            1 => {
                active.insert(exception.service_id.clone());
            }
            2 => {
                active.remove(&exception.service_id);
            }
            _ => {}
        }
    }

    active
}

fn runs_on(calendar: &GtfsCalendar, date: NaiveDate) -> bool {
    let (Some(start), Some(end)) = (
        parse_yyyymmdd(&calendar.start_date),
        parse_yyyymmdd(&calendar.end_date),
    ) else {
        return false;
    };
    if date < start || date > end {
        return false;
    }
    let flag = match date.weekday() {
        Weekday::Mon => calendar.monday,
        Weekday::Tue => calendar.tuesday,
        Weekday::Wed => calendar.wednesday,
        Weekday::Thu => calendar.thursday,
        Weekday::Fri => calendar.friday,
        Weekday::Sat => calendar.saturday,
        Weekday::Sun => calendar.sunday,
    };
    flag == 1
}

/// Every planned stop of every bus trip running on `service_date`, ordered by
/// (canonical trip, first departure of the raw trip, raw trip, stop sequence).
#[tracing::instrument(skip(tables, tz), fields(service_date = %service_date))]
pub fn gtfs_schedule(service_date: NaiveDate, tables: &GtfsStaticTables, tz: Tz) -> Vec<GtfsScheduleStop> {
    let services = active_service_ids(service_date, &tables.calendar, &tables.calendar_dates);
    let bus_routes = bus_route_ids(&tables.routes);

    let trips: HashMap<&str, _> = tables
        .trips
        .iter()
        .filter(|t| services.contains(&t.service_id) && bus_routes.contains(&t.route_id))
        .map(|t| (t.trip_id.as_str(), t))
        .collect();

    let directions: HashMap<(&str, u8), _> = tables
        .directions
        .iter()
        .map(|d| ((d.route_id.as_str(), d.direction_id), d))
        .collect();
    let stops: HashMap<&str, _> = tables.stops.iter().map(|s| (s.stop_id.as_str(), s)).collect();

    let mut rows: Vec<GtfsScheduleStop> = tables
        .stop_times
        .iter()
        .filter_map(|st| {
            let trip = trips.get(st.trip_id.as_str())?;
            let direction = directions.get(&(trip.route_id.as_str(), trip.direction_id));
            let stop = stops.get(st.stop_id.as_str());
            let departure = st
                .departure_time
                .as_deref()
                .or(st.arrival_time.as_deref())
                .and_then(parse_gtfs_time)
                .and_then(|secs| gtfs_seconds_to_utc(service_date, secs, tz));

            Some(GtfsScheduleStop {
                trip_id: canonical_trip_id(&trip.trip_id),
                trip_id_gtfs: trip.trip_id.clone(),
                stop_id: st.stop_id.clone(),
                stop_name: stop.and_then(|s| s.stop_name.clone()),
                parent_station: stop.and_then(|s| s.parent_station.clone()),
                gtfs_stop_sequence: st.stop_sequence,
                timepoint: st.timepoint == Some(1),
                route_id: trip.route_id.clone(),
                direction_id: trip.direction_id,
                direction: direction.map(|d| d.direction.clone()),
                direction_destination: direction.map(|d| d.direction_destination.clone()),
                service_id: trip.service_id.clone(),
                block_id: trip.block_id.clone(),
                route_pattern_id: trip.route_pattern_id.clone(),
                plan_stop_departure_dt: departure,
            })
        })
        .collect();

    // split trips (`_1`, `_2`) share a canonical id; keep each raw trip's
    // stops together, earliest raw trip first
    let mut first_departure: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
    for row in &rows {
        let entry = first_departure.entry(row.trip_id_gtfs.clone()).or_default();
        *entry = min_present(*entry, row.plan_stop_departure_dt);
    }

    rows.sort_by(|a, b| {
        a.trip_id
            .cmp(&b.trip_id)
            .then_with(|| first_departure[&a.trip_id_gtfs].cmp(&first_departure[&b.trip_id_gtfs]))
            .then_with(|| a.trip_id_gtfs.cmp(&b.trip_id_gtfs))
            .then_with(|| a.gtfs_stop_sequence.cmp(&b.gtfs_stop_sequence))
    });

    debug!(
        services = services.len(),
        trips = trips.len(),
        stop_visits = rows.len(),
        "GTFS schedule built"
    );
    rows
}

/// Renumbers the later halves of split trips so GTFS stop sequences keep
/// increasing along the canonical trip. `rows` must be in [`gtfs_schedule`]
/// order.
///
/// Returns the offset added to each renumbered raw trip id.
pub fn continue_split_sequences(rows: &mut [GtfsScheduleStop]) -> HashMap<String, u32> {
    let mut offsets = HashMap::new();
    for trip in rows.chunk_by_mut(|a, b| a.trip_id == b.trip_id) {
        let mut offset = 0;
        for half in trip.chunk_by_mut(|a, b| a.trip_id_gtfs == b.trip_id_gtfs) {
            if offset > 0 {
                for row in half.iter_mut() {
                    row.gtfs_stop_sequence += offset;
                }
                offsets.insert(half[0].trip_id_gtfs.clone(), offset);
            }
            offset = half
                .iter()
                .map(|r| r.gtfs_stop_sequence)
                .max()
                .unwrap_or(offset);
        }
    }
    if !offsets.is_empty() {
        debug!(split_halves = offsets.len(), "Split trip sequences continued");
    }
    offsets
}
