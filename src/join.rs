//! Attaches realtime events to the combined schedule skeleton.
//!
//! Events are grouped per (canonical trip, vehicle label). Every group is its
//! own partition: an overload or a mid-trip vehicle swap yields a second
//! partition under the same trip id, never a merged one. Within a partition
//! each event goes to the skeleton row with its stop id and the nearest
//! sequence, so TM-only and GTFS-only rows survive the join.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::events::{GtfsRealtimeEvent, TmRealtimeEvent};
use crate::schedule::CombinedScheduleRow;

/// One stop visit by one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub service_date: NaiveDate,
    pub schedule: CombinedScheduleRow,
    pub vehicle_label: String,
    pub vehicle_id: Option<String>,
    /// Published GTFS-RT trip id of this vehicle (e.g. with `-OL1`), falling
    /// back to the schedule's.
    pub trip_id_gtfs: Option<String>,
    pub gtfs: Option<GtfsRealtimeEvent>,
    pub tm: Option<TmRealtimeEvent>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinStats {
    pub partitions: usize,
    pub unmatched_gtfs_events: usize,
    pub unmatched_tm_events: usize,
    /// Events on TM-only rows ahead of a partition's first GTFS stop.
    pub trimmed_rows: usize,
}

#[derive(Debug, Default)]
pub struct JoinedEvents {
    /// Ordered by (trip_id, vehicle_label, stop_sequence).
    pub events: Vec<BusEvent>,
    pub stats: JoinStats,
}

#[derive(Default)]
struct VehicleEvents<'a> {
    gtfs: Vec<&'a GtfsRealtimeEvent>,
    tm: Vec<&'a TmRealtimeEvent>,
}

impl VehicleEvents<'_> {
    fn first_seen(&self) -> Option<DateTime<Utc>> {
        let gtfs = self.gtfs.iter().filter_map(|e| e.first_seen());
        let tm = self.tm.iter().filter_map(|e| e.first_seen());
        gtfs.chain(tm).min()
    }
}

#[tracing::instrument(
    skip_all,
    fields(service_date = %service_date, skeleton_rows = schedule.len())
)]
pub fn join_events(
    service_date: NaiveDate,
    schedule: &[CombinedScheduleRow],
    gtfs: &[GtfsRealtimeEvent],
    tm: &[TmRealtimeEvent],
) -> JoinedEvents {
    let mut skeletons: BTreeMap<&str, BTreeMap<Option<i64>, Vec<&CombinedScheduleRow>>> =
        BTreeMap::new();
    for row in schedule {
        skeletons
            .entry(row.trip_id.as_str())
            .or_default()
            .entry(row.tm_pullout_id)
            .or_default()
            .push(row);
    }
    for pullouts in skeletons.values_mut() {
        for rows in pullouts.values_mut() {
            rows.sort_by_key(|r| r.stop_sequence);
        }
    }

    let mut partitions: BTreeMap<(&str, &str), VehicleEvents> = BTreeMap::new();
    for event in gtfs {
        partitions
            .entry((event.trip_id.as_str(), event.vehicle_label.as_str()))
            .or_default()
            .gtfs
            .push(event);
    }
    for event in tm {
        partitions
            .entry((event.trip_id.as_str(), event.vehicle_label.as_str()))
            .or_default()
            .tm
            .push(event);
    }

    let mut joined = JoinedEvents::default();

    for ((trip_id, vehicle_label), events) in partitions {
        let Some(skeleton) = skeletons
            .get(trip_id)
            .and_then(|pullouts| choose_skeleton(pullouts, &events))
        else {
            joined.stats.unmatched_gtfs_events += events.gtfs.len();
            joined.stats.unmatched_tm_events += events.tm.len();
            continue;
        };

        let mut slots: Vec<(Option<&GtfsRealtimeEvent>, Option<&TmRealtimeEvent>)> =
            vec![(None, None); skeleton.len()];

        for event in &events.gtfs {
            let Some(i) = nearest_row(skeleton, &event.stop_id, event.stop_sequence, |r| {
                r.gtfs_stop_sequence
            }) else {
                joined.stats.unmatched_gtfs_events += 1;
                continue;
            };
            let slot = &mut slots[i].0;
            if slot.is_none_or(|current| event.first_seen() < current.first_seen()) {
                *slot = Some(*event);
            }
        }
        for event in &events.tm {
            let Some(i) = nearest_row(skeleton, &event.stop_id, event.tm_stop_sequence, |r| {
                r.tm_stop_sequence
            }) else {
                joined.stats.unmatched_tm_events += 1;
                continue;
            };
            let slot = &mut slots[i].1;
            if slot.is_none_or(|current| event.first_seen() < current.first_seen()) {
                *slot = Some(*event);
            }
        }

        let mut rows: Vec<(&CombinedScheduleRow, Option<&GtfsRealtimeEvent>, Option<&TmRealtimeEvent>)> =
            skeleton
                .iter()
                .zip(slots)
                .filter(|(_, (g, t))| g.is_some() || t.is_some())
                .map(|(row, (g, t))| (*row, g, t))
                .collect();

        if let Some(first_gtfs) = rows.iter().position(|(r, _, _)| r.gtfs_stop_sequence.is_some()) {
            joined.stats.trimmed_rows += first_gtfs;
            rows.drain(..first_gtfs);
        }
        if rows.is_empty() {
            continue;
        }

        joined.stats.partitions += 1;
        let vehicle_id = events.gtfs.iter().find_map(|e| e.vehicle_id.clone());
        let published_trip_id = events.gtfs.first().map(|e| e.trip_id_gtfs.clone());

        for (row, g, t) in rows {
            joined.events.push(BusEvent {
                service_date,
                schedule: row.clone(),
                vehicle_label: vehicle_label.to_string(),
                vehicle_id: vehicle_id.clone(),
                trip_id_gtfs: g
                    .map(|g| g.trip_id_gtfs.clone())
                    .or_else(|| published_trip_id.clone())
                    .or_else(|| row.trip_id_gtfs.clone()),
                gtfs: g.cloned(),
                tm: t.cloned(),
            });
        }
    }

    debug!(
        bus_events = joined.events.len(),
        partitions = joined.stats.partitions,
        unmatched_gtfs = joined.stats.unmatched_gtfs_events,
        unmatched_tm = joined.stats.unmatched_tm_events,
        "Realtime events joined to schedule"
    );
    joined
}

/// The pullout a vehicle ran: the one its TM crossings name, else the one
/// whose first scheduled departure is nearest its first observation, ties to
/// the smaller pullout id.
fn choose_skeleton<'s>(
    pullouts: &'s BTreeMap<Option<i64>, Vec<&'s CombinedScheduleRow>>,
    events: &VehicleEvents,
) -> Option<&'s Vec<&'s CombinedScheduleRow>> {
    if pullouts.len() == 1 {
        return pullouts.values().next();
    }

    let mut named: Vec<&TmRealtimeEvent> = events
        .tm
        .iter()
        .copied()
        .filter(|e| e.tm_pullout_id.is_some_and(|p| pullouts.contains_key(&Some(p))))
        .collect();
    named.sort_by_key(|e| (e.first_seen(), e.tm_stop_sequence));
    if let Some(pullout) = named.first().and_then(|e| e.tm_pullout_id) {
        return pullouts.get(&Some(pullout));
    }

    let Some(seen) = events.first_seen() else {
        return pullouts.values().next();
    };
    pullouts
        .values()
        .min_by_key(|rows| {
            rows.iter()
                .find_map(|r| r.scheduled_departure())
                .map_or(i64::MAX, |dt| (dt - seen).num_seconds().abs())
        })
}

/// Index of the skeleton row at `stop_id` whose sequence (per `sequence_of`,
/// falling back to the canonical position) is nearest `sequence`. An exact
/// match wins outright; ties go to the earlier row.
fn nearest_row(
    skeleton: &[&CombinedScheduleRow],
    stop_id: &str,
    sequence: u32,
    sequence_of: impl Fn(&CombinedScheduleRow) -> Option<u32>,
) -> Option<usize> {
    skeleton
        .iter()
        .enumerate()
        .filter(|(_, r)| r.stop_id == stop_id)
        .min_by_key(|(i, r)| {
            let own = sequence_of(r).unwrap_or(r.stop_sequence);
            (i64::from(own).abs_diff(i64::from(sequence)), *i)
        })
        .map(|(i, _)| i)
}
