//! Raw realtime rows and the per-stop events pivoted from them.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One GTFS-RT vehicle position, flattened.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehiclePing {
    pub vehicle_id: Option<String>,
    pub vehicle_label: Option<String>,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u8>,
    /// `YYYYMMDD`
    pub start_date: Option<String>,
    pub stop_id: Option<String>,
    pub current_stop_sequence: Option<u32>,
    /// Enum name (`STOPPED_AT`) or protobuf number (`1`).
    pub current_status: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One TransitMaster sensor crossing. Times are seconds after local midnight.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StopCrossing {
    pub calendar_id: i64,
    pub is_revenue: String,
    pub route_id: Option<i64>,
    pub geo_node_id: i64,
    pub trip_id: i64,
    pub vehicle_id: i64,
    pub pullout_id: Option<i64>,
    pub pattern_geo_node_seq: u32,
    pub scheduled_time: Option<i64>,
    pub act_arrival_time: Option<i64>,
    pub act_departure_time: Option<i64>,
}

/// A vehicle's visit to one stop as seen by GTFS-RT.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfsRealtimeEvent {
    /// Canonical trip id.
    pub trip_id: String,
    /// The trip id as published, suffix included.
    pub trip_id_gtfs: String,
    pub route_id: Option<String>,
    pub direction_id: Option<u8>,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub vehicle_id: Option<String>,
    pub vehicle_label: String,
    /// First time the vehicle reported travelling toward this stop.
    pub gtfs_travel_to_dt: Option<DateTime<Utc>>,
    /// First time the vehicle reported being stopped at this stop.
    pub gtfs_arrival_dt: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GtfsRealtimeEvent {
    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        crate::fill::min_present(self.gtfs_travel_to_dt, self.gtfs_arrival_dt)
    }
}

/// A vehicle's visit to one stop as seen by TransitMaster.
#[derive(Debug, Clone, PartialEq)]
pub struct TmRealtimeEvent {
    pub trip_id: String,
    /// GTFS form of the TM route abbreviation.
    pub route_id: String,
    pub stop_id: String,
    pub tm_stop_sequence: u32,
    pub vehicle_label: String,
    pub tm_pullout_id: Option<i64>,
    pub tm_scheduled_dt: Option<DateTime<Utc>>,
    pub tm_arrival_dt: Option<DateTime<Utc>>,
    pub tm_departure_dt: Option<DateTime<Utc>>,
}

impl TmRealtimeEvent {
    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        crate::fill::min_present(self.tm_arrival_dt, self.tm_departure_dt)
    }
}
