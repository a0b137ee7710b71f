//! Pivots GTFS-RT vehicle positions into per-stop events.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use super::types::{GtfsRealtimeEvent, VehiclePing};
use crate::time::{parse_yyyymmdd, unix_to_utc};
use crate::trip_id::{canonical_trip_id, scheduled_trip_id};

/// `current_status` after `INCOMING_AT` is folded into `IN_TRANSIT_TO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    InTransitTo,
    StoppedAt,
}

impl StopStatus {
    /// Accepts enum names or protobuf numbers. A missing status is
    /// `IN_TRANSIT_TO`, the GTFS-RT default.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Some(StopStatus::InTransitTo);
        };
        match raw.to_ascii_uppercase().as_str() {
            "INCOMING_AT" | "IN_TRANSIT_TO" | "0" | "2" => Some(StopStatus::InTransitTo),
            "STOPPED_AT" | "1" => Some(StopStatus::StoppedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    trip_id_gtfs: String,
    direction_id: Option<u8>,
    stop_id: String,
    stop_sequence: u32,
    vehicle_label: String,
}

#[derive(Default)]
struct Pivot {
    vehicle_id: Option<String>,
    route_id: Option<String>,
    in_transit: Option<(DateTime<Utc>, Option<f64>, Option<f64>)>,
    stopped: Option<DateTime<Utc>>,
}

/// Collapses per-second pings into one event per
/// `(trip, direction, stop, stop_sequence, vehicle)`.
///
/// Only pings on `bus_routes` with a trip, stop, sequence and vehicle are
/// used. Pings whose `start_date` names another service date are dropped.
#[tracing::instrument(skip_all, fields(service_date = %service_date, pings = pings.len()))]
pub fn gtfs_events(
    service_date: NaiveDate,
    pings: &[VehiclePing],
    bus_routes: &BTreeSet<String>,
) -> Vec<GtfsRealtimeEvent> {
    let mut groups: BTreeMap<EventKey, Pivot> = BTreeMap::new();
    let mut skipped = 0usize;

    for ping in pings {
        let Some((key, status, ts)) = keyed_ping(service_date, ping, bus_routes) else {
            skipped += 1;
            continue;
        };

        let pivot = groups.entry(key).or_default();
        if pivot.vehicle_id.is_none() {
            pivot.vehicle_id = ping.vehicle_id.clone();
        }
        if pivot.route_id.is_none() {
            pivot.route_id = ping.route_id.clone();
        }
        match status {
            StopStatus::InTransitTo => {
                // coordinates come from the in-transit ping
                if pivot.in_transit.is_none_or(|(t, _, _)| ts < t) {
                    pivot.in_transit = Some((ts, ping.latitude, ping.longitude));
                }
            }
            StopStatus::StoppedAt => {
                if pivot.stopped.is_none_or(|t| ts < t) {
                    pivot.stopped = Some(ts);
                }
            }
        }
    }

    let events: Vec<GtfsRealtimeEvent> = groups
        .into_iter()
        .map(|(key, pivot)| GtfsRealtimeEvent {
            trip_id: canonical_trip_id(&key.trip_id_gtfs),
            trip_id_gtfs: key.trip_id_gtfs,
            route_id: pivot.route_id,
            direction_id: key.direction_id,
            stop_id: key.stop_id,
            stop_sequence: key.stop_sequence,
            vehicle_id: pivot.vehicle_id,
            vehicle_label: key.vehicle_label,
            gtfs_travel_to_dt: pivot.in_transit.map(|(t, _, _)| t),
            gtfs_arrival_dt: pivot.stopped,
            latitude: pivot.in_transit.and_then(|(_, lat, _)| lat),
            longitude: pivot.in_transit.and_then(|(_, _, lon)| lon),
        })
        .collect();

    debug!(events = events.len(), skipped, "GTFS-RT events extracted");
    events
}

fn keyed_ping(
    service_date: NaiveDate,
    ping: &VehiclePing,
    bus_routes: &BTreeSet<String>,
) -> Option<(EventKey, StopStatus, DateTime<Utc>)> {
    if !bus_routes.contains(ping.route_id.as_deref()?) {
        return None;
    }
    if let Some(start_date) = ping.start_date.as_deref().filter(|s| !s.trim().is_empty()) {
        if parse_yyyymmdd(start_date) != Some(service_date) {
            return None;
        }
    }
    let vehicle_label = ping
        .vehicle_label
        .clone()
        .or_else(|| ping.vehicle_id.clone())?;
    let status = StopStatus::parse(ping.current_status.as_deref())?;
    let ts = unix_to_utc(ping.timestamp)?;

    Some((
        EventKey {
            trip_id_gtfs: ping.trip_id.clone()?,
            direction_id: ping.direction_id,
            stop_id: ping.stop_id.clone()?,
            stop_sequence: ping.current_stop_sequence?,
            vehicle_label,
        },
        status,
        ts,
    ))
}

/// Partition coordinates parsed out of a `.../year=/month=/day=[/hour=]/` path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Partition {
    prefix: String,
    day: (i32, u32, u32),
    hour: Option<u32>,
}

fn parse_partition(path: &str) -> Option<Partition> {
    let mut prefix = Vec::new();
    let (mut year, mut month, mut day, mut hour) = (None, None, None, None);

    for part in path.split('/') {
        if let Some(v) = part.strip_prefix("year=") {
            year = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("month=") {
            month = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("day=") {
            day = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("hour=") {
            hour = v.parse().ok();
        } else if year.is_none() {
            prefix.push(part);
        }
    }

    Some(Partition {
        prefix: prefix.join("/"),
        day: (year?, month?, day?),
        hour,
    })
}

/// Drops hourly files made redundant by a full-day file of the same prefix
/// and day. Paths without partition coordinates are kept. The result is
/// sorted.
pub fn dedupe_partition_files(paths: &[String]) -> Vec<String> {
    let full_days: BTreeSet<(String, (i32, u32, u32))> = paths
        .iter()
        .filter_map(|p| parse_partition(p))
        .filter(|p| p.hour.is_none())
        .map(|p| (p.prefix, p.day))
        .collect();

    let mut kept: Vec<String> = paths
        .iter()
        .filter(|path| match parse_partition(path) {
            Some(p) if p.hour.is_some() => !full_days.contains(&(p.prefix, p.day)),
            _ => true,
        })
        .cloned()
        .collect();
    kept.sort();
    kept.dedup();
    kept
}

/// Shifts the stop sequences of events on split-trip halves by the offsets
/// [`crate::schedule::continue_split_sequences`] applied to the schedule.
pub fn continue_split_event_sequences(
    events: &mut [GtfsRealtimeEvent],
    offsets: &HashMap<String, u32>,
) {
    if offsets.is_empty() {
        return;
    }
    for event in events {
        if let Some(offset) = offsets.get(&scheduled_trip_id(&event.trip_id_gtfs)) {
            event.stop_sequence += offset;
        }
    }
}
