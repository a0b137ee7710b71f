//! Time since the previous bus departed the same stop.

use std::collections::BTreeMap;

use crate::metrics::types::BusPerformanceMetrics;

/// Fills both headway columns in place. Rows without a departure get none and
/// do not count as a previous visit.
pub fn apply_headways(rows: &mut [BusPerformanceMetrics]) {
    let by_route_direction = headways(rows, |r| {
        (
            r.service_date,
            r.stop_id.clone(),
            r.direction_id,
            r.route_id.clone(),
        )
    });
    let by_destination = headways(rows, |r| {
        (
            r.service_date,
            r.stop_id.clone(),
            r.direction_destination.clone(),
        )
    });

    for (i, row) in rows.iter_mut().enumerate() {
        row.route_direction_headway_seconds = by_route_direction[i];
        row.direction_destination_headway_seconds = by_destination[i];
    }
}

/// Per-row headway within partitions of `key`, visits ordered by
/// (departure, trip_id, vehicle_label).
fn headways<K: Ord>(
    rows: &[BusPerformanceMetrics],
    key: impl Fn(&BusPerformanceMetrics) -> K,
) -> Vec<Option<i64>> {
    let mut partitions: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        if row.stop_departure_dt.is_some() {
            partitions.entry(key(row)).or_default().push(i);
        }
    }

    let mut out = vec![None; rows.len()];
    for visits in partitions.values_mut() {
        visits.sort_by(|&a, &b| {
            let (a, b) = (&rows[a], &rows[b]);
            (a.stop_departure_dt, &a.trip_id, &a.vehicle_label).cmp(&(
                b.stop_departure_dt,
                &b.trip_id,
                &b.vehicle_label,
            ))
        });
        for pair in visits.windows(2) {
            if let (Some(previous), Some(current)) =
                (rows[pair[0]].stop_departure_dt, rows[pair[1]].stop_departure_dt)
            {
                out[pair[1]] = Some((current - previous).num_seconds());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::derive::derive_partition;
    use crate::metrics::derive::tests::event;
    use crate::schedule::PointType;

    fn visit(trip: &str, vehicle: &str, departure_minute: i64) -> BusPerformanceMetrics {
        let mut e = event(1, PointType::Start, None, Some((Some(departure_minute), None)));
        e.schedule.trip_id = trip.into();
        e.vehicle_label = vehicle.into();
        derive_partition(&[e]).remove(0)
    }

    #[test]
    fn test_headway_orders_by_departure() {
        let mut rows = vec![
            visit("t2", "b", 10),
            visit("t1", "a", 0),
            visit("t3", "c", 25),
        ];
        apply_headways(&mut rows);

        assert_eq!(rows[1].route_direction_headway_seconds, None);
        assert_eq!(rows[0].route_direction_headway_seconds, Some(600));
        assert_eq!(rows[2].route_direction_headway_seconds, Some(900));
        assert_eq!(rows[2].direction_destination_headway_seconds, Some(900));
    }

    #[test]
    fn test_headway_partitions_are_independent() {
        let mut other_route = visit("t2", "b", 10);
        other_route.route_id = Some("2".into());
        let mut rows = vec![visit("t1", "a", 0), other_route];
        apply_headways(&mut rows);

        assert_eq!(rows[1].route_direction_headway_seconds, None);
        // same stop and destination regardless of route
        assert_eq!(rows[1].direction_destination_headway_seconds, Some(600));
    }

    #[test]
    fn test_simultaneous_departures_tie_break_on_trip() {
        let mut rows = vec![visit("t2", "a", 5), visit("t1", "a", 5)];
        apply_headways(&mut rows);
        assert_eq!(rows[1].route_direction_headway_seconds, None);
        assert_eq!(rows[0].route_direction_headway_seconds, Some(0));
    }
}
