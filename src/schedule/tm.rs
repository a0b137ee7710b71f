//! Builds the TransitMaster planned stop visits for one service date.

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::HashMap;
use tracing::debug;

use super::types::{TmScheduleStop, TmStaticTables};
use crate::time::local_seconds_to_utc;
use crate::trip_id::canonical_trip_id;

/// Every scheduled passing of every pullout, including non-revenue
/// timepoints, ordered by (trip, pullout, pattern sequence).
///
/// Rows whose trip, pattern position or geo node are unknown to the dimension
/// tables are dropped, as an inner join would.
#[tracing::instrument(skip(tables, tz), fields(service_date = %service_date))]
pub fn tm_schedule(service_date: NaiveDate, tables: &TmStaticTables, tz: Tz) -> Vec<TmScheduleStop> {
    let trips: HashMap<i64, _> = tables.trips.iter().map(|t| (t.trip_id, t)).collect();
    let geo_nodes: HashMap<i64, _> = tables.geo_nodes.iter().map(|g| (g.geo_node_id, g)).collect();
    let time_points: HashMap<i64, _> = tables
        .time_points
        .iter()
        .map(|t| (t.time_point_id, t))
        .collect();
    let pattern_nodes: HashMap<(i64, u32), _> = tables
        .pattern_geo_nodes
        .iter()
        .map(|p| ((p.pattern_id, p.pattern_geo_node_seq), p))
        .collect();
    let work_pieces: HashMap<i64, _> = tables.work_pieces.iter().map(|w| (w.pullout_id, w)).collect();

    let mut dropped = 0usize;
    let mut rows: Vec<TmScheduleStop> = Vec::with_capacity(tables.schedule_stops.len());

    for passing in &tables.schedule_stops {
        let joined = trips.get(&passing.trip_id).and_then(|trip| {
            let node = pattern_nodes.get(&(trip.pattern_id, passing.pattern_geo_node_seq))?;
            let geo = geo_nodes.get(&node.geo_node_id)?;
            Some((trip, node, geo))
        });
        let Some((trip, node, geo)) = joined else {
            dropped += 1;
            continue;
        };

        let time_point = node.time_point_id.and_then(|id| time_points.get(&id));
        let work_piece = work_pieces.get(&passing.pullout_id);

        rows.push(TmScheduleStop {
            trip_id: canonical_trip_id(&trip.trip_serial_number.to_string()),
            tm_pullout_id: passing.pullout_id,
            stop_id: geo.geo_node_abbr.clone(),
            tm_stop_sequence: passing.pattern_geo_node_seq,
            tm_pattern_id: trip.pattern_id,
            timepoint_id: node.time_point_id,
            timepoint_abbr: time_point.map(|t| t.time_point_abbr.clone()),
            timepoint_name: time_point.and_then(|t| t.time_point_name.clone()),
            tm_block_id: work_piece.and_then(|w| w.block_id.clone()),
            tm_run_id: work_piece.and_then(|w| w.run_id.clone()),
            tm_stop_departure_dt: passing
                .scheduled_time
                .and_then(|secs| local_seconds_to_utc(service_date, secs, tz)),
        });
    }

    rows.sort_by(|a, b| {
        (&a.trip_id, a.tm_pullout_id, a.tm_stop_sequence).cmp(&(
            &b.trip_id,
            b.tm_pullout_id,
            b.tm_stop_sequence,
        ))
    });
    rows.dedup_by(|a, b| {
        a.trip_id == b.trip_id
            && a.tm_pullout_id == b.tm_pullout_id
            && a.tm_stop_sequence == b.tm_stop_sequence
    });

    debug!(stop_visits = rows.len(), dropped, "TM schedule built");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::types::{
        TmDailyScheduleStop, TmDailyWorkPiece, TmGeoNode, TmPatternGeoNode, TmRoute, TmTimePoint,
        TmTrip,
    };
    use chrono_tz::America::New_York;

    fn tables() -> TmStaticTables {
        let node = |seq: u32, geo: i64, tp: Option<i64>| TmPatternGeoNode {
            pattern_id: 9,
            pattern_geo_node_seq: seq,
            geo_node_id: geo,
            time_point_id: tp,
        };
        let passing = |seq: u32, secs: i64| TmDailyScheduleStop {
            pullout_id: 55,
            trip_id: 1,
            pattern_geo_node_seq: seq,
            scheduled_time: Some(secs),
        };
        TmStaticTables {
            geo_nodes: vec![
                TmGeoNode {
                    geo_node_id: 10,
                    geo_node_abbr: "s1".into(),
                    geo_node_name: None,
                },
                TmGeoNode {
                    geo_node_id: 11,
                    geo_node_abbr: "garage".into(),
                    geo_node_name: None,
                },
            ],
            routes: vec![TmRoute {
                route_id: 4,
                route_abbr: "01".into(),
            }],
            trips: vec![TmTrip {
                trip_id: 1,
                trip_serial_number: 70040149,
                pattern_id: 9,
                route_id: Some(4),
            }],
            pattern_geo_nodes: vec![node(1, 11, None), node(2, 10, Some(77))],
            time_points: vec![TmTimePoint {
                time_point_id: 77,
                time_point_abbr: "FRST".into(),
                time_point_name: Some("First".into()),
            }],
            work_pieces: vec![TmDailyWorkPiece {
                pullout_id: 55,
                block_id: Some("B9".into()),
                run_id: None,
                operator_id: None,
            }],
            // the unknown pattern position 3 is dropped
            schedule_stops: vec![passing(2, 8 * 3600), passing(1, 8 * 3600 - 300), passing(3, 1)],
            ..Default::default()
        }
    }

    #[test]
    fn test_translates_ids_and_orders_by_sequence() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let rows = tm_schedule(date, &tables(), New_York);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stop_id, "garage");
        assert_eq!(rows[1].stop_id, "s1");
        assert!(rows.iter().all(|r| r.trip_id == "70040149"));
        assert_eq!(rows[1].timepoint_abbr.as_deref(), Some("FRST"));
        assert_eq!(rows[1].tm_block_id.as_deref(), Some("B9"));
        assert_eq!(
            rows[1].tm_stop_departure_dt,
            Some("2024-06-12T12:00:00Z".parse().unwrap())
        );
    }
}
