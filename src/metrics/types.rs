use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{PointType, Provenance};

/// One published row: a vehicle's visit to one stop with reconciled times.
///
/// Field order is the column order of `bus_performance_metrics.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusPerformanceMetrics {
    pub service_date: NaiveDate,
    pub trip_id: String,
    pub trip_id_gtfs: Option<String>,
    pub tm_pullout_id: Option<i64>,
    pub vehicle_label: String,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u8>,
    pub direction: Option<String>,
    pub direction_destination: Option<String>,
    pub service_id: Option<String>,
    pub block_id: Option<String>,
    pub route_pattern_id: Option<String>,
    pub tm_pattern_id: Option<i64>,
    pub tm_block_id: Option<String>,
    pub tm_run_id: Option<String>,

    pub stop_sequence: u32,
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub parent_station: Option<String>,
    pub gtfs_stop_sequence: Option<u32>,
    pub tm_stop_sequence: Option<u32>,
    pub provenance: Provenance,
    pub point_type: PointType,
    pub timepoint_id: Option<i64>,
    pub timepoint_abbr: Option<String>,
    pub timepoint_name: Option<String>,
    pub plan_stop_departure_dt: Option<DateTime<Utc>>,
    pub tm_stop_departure_dt: Option<DateTime<Utc>>,

    pub gtfs_travel_to_dt: Option<DateTime<Utc>>,
    pub gtfs_arrival_dt: Option<DateTime<Utc>>,
    pub gtfs_departure_dt: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub tm_scheduled_dt: Option<DateTime<Utc>>,
    pub tm_arrival_dt: Option<DateTime<Utc>>,
    pub tm_departure_dt: Option<DateTime<Utc>>,

    pub stop_arrival_dt: Option<DateTime<Utc>>,
    pub stop_departure_dt: Option<DateTime<Utc>>,
    pub travel_time_seconds: Option<i64>,
    pub stopped_duration_seconds: Option<i64>,
    pub route_direction_headway_seconds: Option<i64>,
    pub direction_destination_headway_seconds: Option<i64>,
    pub is_full_trip: bool,
}

impl BusPerformanceMetrics {
    /// The (trip, vehicle) partition this row belongs to.
    pub fn partition_key(&self) -> (&str, &str) {
        (&self.trip_id, &self.vehicle_label)
    }
}
