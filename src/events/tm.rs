//! Translates TransitMaster stop crossings into per-stop events.

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::types::{StopCrossing, TmRealtimeEvent};
use crate::schedule::TmStaticTables;
use crate::time::{local_seconds_to_utc, tm_calendar_id};
use crate::trip_id::{canonical_trip_id, tm_route_id};

/// Revenue crossings of `service_date`, with TM numeric keys translated to
/// GTFS-comparable ids through the GEO_NODE, ROUTE, TRIP and VEHICLE tables.
///
/// Crossings without a known geo node, trip or vehicle, and crossings with
/// neither an actual arrival nor departure, are dropped. Repeated crossings
/// of one pattern position by one vehicle keep the earliest.
#[tracing::instrument(skip_all, fields(service_date = %service_date, crossings = crossings.len()))]
pub fn tm_events(
    service_date: NaiveDate,
    crossings: &[StopCrossing],
    tables: &TmStaticTables,
    tz: Tz,
) -> Vec<TmRealtimeEvent> {
    let calendar_id = tm_calendar_id(service_date);
    let geo_nodes: HashMap<i64, &str> = tables
        .geo_nodes
        .iter()
        .map(|g| (g.geo_node_id, g.geo_node_abbr.as_str()))
        .collect();
    let routes: HashMap<i64, &str> = tables
        .routes
        .iter()
        .map(|r| (r.route_id, r.route_abbr.as_str()))
        .collect();
    let trips: HashMap<i64, i64> = tables
        .trips
        .iter()
        .map(|t| (t.trip_id, t.trip_serial_number))
        .collect();
    let vehicles: HashMap<i64, &str> = tables
        .vehicles
        .iter()
        .map(|v| (v.vehicle_id, v.property_tag.as_str()))
        .collect();

    let to_utc = |secs: Option<i64>| secs.and_then(|s| local_seconds_to_utc(service_date, s, tz));

    let mut kept: BTreeMap<(String, String, u32, String), TmRealtimeEvent> = BTreeMap::new();
    let mut skipped = 0usize;

    for crossing in crossings {
        if crossing.calendar_id != calendar_id || !crossing.is_revenue.trim().eq_ignore_ascii_case("R") {
            skipped += 1;
            continue;
        }
        let (Some(stop_id), Some(route_abbr), Some(serial), Some(vehicle_label)) = (
            geo_nodes.get(&crossing.geo_node_id),
            crossing.route_id.and_then(|id| routes.get(&id)),
            trips.get(&crossing.trip_id),
            vehicles.get(&crossing.vehicle_id),
        ) else {
            skipped += 1;
            continue;
        };

        let event = TmRealtimeEvent {
            trip_id: canonical_trip_id(&serial.to_string()),
            route_id: tm_route_id(route_abbr),
            stop_id: stop_id.to_string(),
            tm_stop_sequence: crossing.pattern_geo_node_seq,
            vehicle_label: vehicle_label.to_string(),
            tm_pullout_id: crossing.pullout_id,
            tm_scheduled_dt: to_utc(crossing.scheduled_time),
            tm_arrival_dt: to_utc(crossing.act_arrival_time),
            tm_departure_dt: to_utc(crossing.act_departure_time),
        };
        if event.first_seen().is_none() {
            skipped += 1;
            continue;
        }

        let key = (
            event.trip_id.clone(),
            event.vehicle_label.clone(),
            event.tm_stop_sequence,
            event.stop_id.clone(),
        );
        match kept.get(&key) {
            Some(existing) if existing.first_seen() <= event.first_seen() => {}
            _ => {
                kept.insert(key, event);
            }
        }
    }

    let events: Vec<TmRealtimeEvent> = kept.into_values().collect();
    debug!(events = events.len(), skipped, "TM events extracted");
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::types::{TmGeoNode, TmRoute, TmTrip, TmVehicle};
    use chrono_tz::America::New_York;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    fn tables() -> TmStaticTables {
        TmStaticTables {
            geo_nodes: vec![TmGeoNode {
                geo_node_id: 10,
                geo_node_abbr: "s1".into(),
                geo_node_name: None,
            }],
            routes: vec![TmRoute {
                route_id: 4,
                route_abbr: "0742".into(),
            }],
            trips: vec![TmTrip {
                trip_id: 1,
                trip_serial_number: 68245216,
                pattern_id: 9,
                route_id: Some(4),
            }],
            vehicles: vec![TmVehicle {
                vehicle_id: 3,
                property_tag: "1234".into(),
            }],
            ..Default::default()
        }
    }

    fn crossing(arrival: Option<i64>) -> StopCrossing {
        StopCrossing {
            calendar_id: 120240612,
            is_revenue: "R".into(),
            route_id: Some(4),
            geo_node_id: 10,
            trip_id: 1,
            vehicle_id: 3,
            pullout_id: Some(55),
            pattern_geo_node_seq: 2,
            scheduled_time: Some(8 * 3600),
            act_arrival_time: arrival,
            act_departure_time: arrival.map(|a| a + 30),
        }
    }

    #[test]
    fn test_translates_ids_and_times() {
        let events = tm_events(date(), &[crossing(Some(8 * 3600 + 60))], &tables(), New_York);

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.trip_id, "68245216");
        assert_eq!(e.route_id, "742");
        assert_eq!(e.stop_id, "s1");
        assert_eq!(e.vehicle_label, "1234");
        assert_eq!(e.tm_arrival_dt, Some("2024-06-12T12:01:00Z".parse().unwrap()));
        assert_eq!(e.tm_departure_dt, Some("2024-06-12T12:01:30Z".parse().unwrap()));
    }

    #[test]
    fn test_drops_non_revenue_other_dates_and_empty_crossings() {
        let mut non_revenue = crossing(Some(8 * 3600));
        non_revenue.is_revenue = "N".into();
        let mut other_day = crossing(Some(8 * 3600));
        other_day.calendar_id = 120240611;
        let mut unknown_vehicle = crossing(Some(8 * 3600));
        unknown_vehicle.vehicle_id = 99;
        let mut unknown_route = crossing(Some(8 * 3600));
        unknown_route.route_id = Some(5);
        let mut no_route = crossing(Some(8 * 3600));
        no_route.route_id = None;

        let events = tm_events(
            date(),
            &[
                non_revenue,
                other_day,
                unknown_vehicle,
                unknown_route,
                no_route,
                crossing(None),
            ],
            &tables(),
            New_York,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_repeated_crossing_keeps_earliest() {
        let events = tm_events(
            date(),
            &[crossing(Some(8 * 3600 + 120)), crossing(Some(8 * 3600 + 60))],
            &tables(),
            New_York,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tm_arrival_dt, Some("2024-06-12T12:01:00Z".parse().unwrap()));
    }
}
