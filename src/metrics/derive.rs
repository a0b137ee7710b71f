//! Reconciles the two observations of each stop visit into one arrival and
//! one departure, then derives durations from them.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::fill::{forward_fill, lead, max_present, min_present, shifted_cummax};
use crate::join::BusEvent;
use crate::metrics::headway::apply_headways;
use crate::metrics::types::BusPerformanceMetrics;
use crate::schedule::PointType;

type Instant = Option<DateTime<Utc>>;

/// Derives metrics for every (trip, vehicle) partition, then headways across
/// partitions.
///
/// `events` must be ordered by (trip_id, vehicle_label, stop_sequence), which
/// is what [`crate::join::join_events`] returns.
#[tracing::instrument(skip_all, fields(bus_events = events.len()))]
pub fn derive_metrics(events: &[BusEvent]) -> Vec<BusPerformanceMetrics> {
    let mut rows: Vec<BusPerformanceMetrics> = events
        .chunk_by(|a, b| {
            a.schedule.trip_id == b.schedule.trip_id && a.vehicle_label == b.vehicle_label
        })
        .flat_map(derive_partition)
        .collect();

    apply_headways(&mut rows);
    debug!(rows = rows.len(), "Metrics derived");
    rows
}

/// One (trip, vehicle) partition in stop order.
pub fn derive_partition(partition: &[BusEvent]) -> Vec<BusPerformanceMetrics> {
    let n = partition.len();
    if n == 0 {
        return Vec::new();
    }

    let travel_to: Vec<Instant> = partition
        .iter()
        .map(|e| e.gtfs.as_ref().and_then(|g| g.gtfs_travel_to_dt))
        .collect();
    let gtfs_departure = lead(&travel_to);

    let mut arrivals: Vec<Instant> = Vec::with_capacity(n);
    let mut departures: Vec<Instant> = Vec::with_capacity(n);

    for (i, event) in partition.iter().enumerate() {
        let gtfs_arrival = event.gtfs.as_ref().and_then(|g| g.gtfs_arrival_dt);
        let tm_arrival = event.tm.as_ref().and_then(|t| t.tm_arrival_dt);
        let tm_departure = event.tm.as_ref().and_then(|t| t.tm_departure_dt);
        let latest_arrival = max_present(gtfs_arrival, tm_arrival);

        let (arrival, departure) = if i == 0 {
            let departure = gtfs_departure[i].or(tm_departure);
            (min_present(latest_arrival, departure), departure)
        } else if i == n - 1 {
            (latest_arrival, latest_arrival)
        } else {
            // earliest departure but latest arrival
            let departure = min_present(tm_departure, gtfs_departure[i]);
            (min_present(latest_arrival, departure), departure)
        };

        arrivals.push(arrival.or(departure));
        departures.push(departure.or(arrival));
    }

    let reconciled: Vec<Instant> = arrivals
        .iter()
        .zip(&departures)
        .map(|(a, d)| max_present(*a, *d))
        .collect();
    let floors = shifted_cummax(&reconciled);
    for ((arrival, departure), floor) in arrivals.iter_mut().zip(departures.iter_mut()).zip(&floors) {
        *arrival = raise_to(*arrival, *floor);
        *departure = raise_to(*departure, *floor);
    }

    let mut previous_departure: Vec<Instant> = std::iter::once(None)
        .chain(departures.iter().take(n - 1).copied())
        .collect();
    forward_fill(&mut previous_departure);

    let is_full_trip = partition
        .iter()
        .any(|e| e.schedule.point_type == PointType::Start)
        && partition
            .iter()
            .any(|e| e.schedule.point_type == PointType::End);

    partition
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let arrival = arrivals[i];
            let departure = departures[i];
            let mut row = to_metrics(event, gtfs_departure[i], is_full_trip);
            row.stop_arrival_dt = arrival;
            row.stop_departure_dt = departure;
            row.travel_time_seconds = seconds_between(previous_departure[i], arrival);
            row.stopped_duration_seconds = seconds_between(arrival, departure);
            row
        })
        .collect()
}

fn raise_to(value: Instant, floor: Instant) -> Instant {
    match (value, floor) {
        (Some(v), Some(f)) if v < f => Some(f),
        _ => value,
    }
}

fn seconds_between(from: Instant, to: Instant) -> Option<i64> {
    Some((to? - from?).num_seconds())
}

fn to_metrics(
    event: &BusEvent,
    gtfs_departure: Instant,
    is_full_trip: bool,
) -> BusPerformanceMetrics {
    let s = &event.schedule;
    let gtfs = event.gtfs.as_ref();
    let tm = event.tm.as_ref();

    BusPerformanceMetrics {
        service_date: event.service_date,
        trip_id: s.trip_id.clone(),
        trip_id_gtfs: event.trip_id_gtfs.clone(),
        tm_pullout_id: s.tm_pullout_id,
        vehicle_label: event.vehicle_label.clone(),
        vehicle_id: event.vehicle_id.clone(),
        route_id: s.route_id.clone().or_else(|| tm.map(|t| t.route_id.clone())),
        direction_id: s.direction_id,
        direction: s.direction.clone(),
        direction_destination: s.direction_destination.clone(),
        service_id: s.service_id.clone(),
        block_id: s.block_id.clone(),
        route_pattern_id: s.route_pattern_id.clone(),
        tm_pattern_id: s.tm_pattern_id,
        tm_block_id: s.tm_block_id.clone(),
        tm_run_id: s.tm_run_id.clone(),
        stop_sequence: s.stop_sequence,
        stop_id: s.stop_id.clone(),
        stop_name: s.stop_name.clone(),
        parent_station: s.parent_station.clone(),
        gtfs_stop_sequence: s.gtfs_stop_sequence,
        tm_stop_sequence: s.tm_stop_sequence,
        provenance: s.provenance,
        point_type: s.point_type,
        timepoint_id: s.timepoint_id,
        timepoint_abbr: s.timepoint_abbr.clone(),
        timepoint_name: s.timepoint_name.clone(),
        plan_stop_departure_dt: s.plan_stop_departure_dt,
        tm_stop_departure_dt: s.tm_stop_departure_dt,
        gtfs_travel_to_dt: gtfs.and_then(|g| g.gtfs_travel_to_dt),
        gtfs_arrival_dt: gtfs.and_then(|g| g.gtfs_arrival_dt),
        gtfs_departure_dt: gtfs_departure,
        latitude: gtfs.and_then(|g| g.latitude),
        longitude: gtfs.and_then(|g| g.longitude),
        tm_scheduled_dt: tm.and_then(|t| t.tm_scheduled_dt),
        tm_arrival_dt: tm.and_then(|t| t.tm_arrival_dt),
        tm_departure_dt: tm.and_then(|t| t.tm_departure_dt),
        stop_arrival_dt: None,
        stop_departure_dt: None,
        travel_time_seconds: None,
        stopped_duration_seconds: None,
        route_direction_headway_seconds: None,
        direction_destination_headway_seconds: None,
        is_full_trip,
    }
}
