//! Static schedule tables as read from upstream, and the per-stop schedule
//! records built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// GTFS static tables

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsTrip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub direction_id: u8,
    pub block_id: Option<String>,
    pub route_pattern_id: Option<String>,
    pub trip_headsign: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsStopTime {
    pub trip_id: String,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub timepoint: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsRoute {
    pub route_id: String,
    pub route_type: u16,
    pub route_short_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsDirection {
    pub route_id: String,
    pub direction_id: u8,
    pub direction: String,
    pub direction_destination: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsRoutePattern {
    pub route_pattern_id: String,
    pub route_id: String,
    pub direction_id: u8,
    pub route_pattern_typicality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsStop {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsCalendar {
    pub service_id: String,
    pub monday: u8,
    pub tuesday: u8,
    pub wednesday: u8,
    pub thursday: u8,
    pub friday: u8,
    pub saturday: u8,
    pub sunday: u8,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsCalendarDate {
    pub service_id: String,
    pub date: String,
    pub exception_type: u8,
}

#[derive(Debug, Clone, Default)]
pub struct GtfsStaticTables {
    pub trips: Vec<GtfsTrip>,
    pub stop_times: Vec<GtfsStopTime>,
    pub routes: Vec<GtfsRoute>,
    pub directions: Vec<GtfsDirection>,
    pub route_patterns: Vec<GtfsRoutePattern>,
    pub stops: Vec<GtfsStop>,
    pub calendar: Vec<GtfsCalendar>,
    pub calendar_dates: Vec<GtfsCalendarDate>,
}

// TransitMaster static tables

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmGeoNode {
    pub geo_node_id: i64,
    pub geo_node_abbr: String,
    pub geo_node_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmRoute {
    pub route_id: i64,
    pub route_abbr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmTrip {
    pub trip_id: i64,
    pub trip_serial_number: i64,
    pub pattern_id: i64,
    pub route_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmVehicle {
    pub vehicle_id: i64,
    pub property_tag: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmPatternGeoNode {
    pub pattern_id: i64,
    pub pattern_geo_node_seq: u32,
    pub geo_node_id: i64,
    pub time_point_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmTimePoint {
    pub time_point_id: i64,
    pub time_point_abbr: String,
    pub time_point_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmDailyWorkPiece {
    pub pullout_id: i64,
    pub block_id: Option<String>,
    pub run_id: Option<String>,
    pub operator_id: Option<String>,
}

/// One scheduled passing of a pullout at a pattern position, in seconds after
/// local midnight.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TmDailyScheduleStop {
    pub pullout_id: i64,
    pub trip_id: i64,
    pub pattern_geo_node_seq: u32,
    pub scheduled_time: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TmStaticTables {
    pub geo_nodes: Vec<TmGeoNode>,
    pub routes: Vec<TmRoute>,
    pub trips: Vec<TmTrip>,
    pub vehicles: Vec<TmVehicle>,
    pub pattern_geo_nodes: Vec<TmPatternGeoNode>,
    pub time_points: Vec<TmTimePoint>,
    pub work_pieces: Vec<TmDailyWorkPiece>,
    pub schedule_stops: Vec<TmDailyScheduleStop>,
}

// Schedule records

/// One planned revenue stop of a GTFS trip on the service date.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfsScheduleStop {
    /// Canonical trip id.
    pub trip_id: String,
    pub trip_id_gtfs: String,
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub parent_station: Option<String>,
    pub gtfs_stop_sequence: u32,
    pub timepoint: bool,
    pub route_id: String,
    pub direction_id: u8,
    pub direction: Option<String>,
    pub direction_destination: Option<String>,
    pub service_id: String,
    pub block_id: Option<String>,
    pub route_pattern_id: Option<String>,
    pub plan_stop_departure_dt: Option<DateTime<Utc>>,
}

/// One stop or timepoint of a TransitMaster pullout, revenue or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TmScheduleStop {
    /// Canonical trip id (the TM trip serial number).
    pub trip_id: String,
    pub tm_pullout_id: i64,
    pub stop_id: String,
    pub tm_stop_sequence: u32,
    pub tm_pattern_id: i64,
    pub timepoint_id: Option<i64>,
    pub timepoint_abbr: Option<String>,
    pub timepoint_name: Option<String>,
    pub tm_block_id: Option<String>,
    pub tm_run_id: Option<String>,
    pub tm_stop_departure_dt: Option<DateTime<Utc>>,
}

/// Which static schedule(s) a combined row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "GTFS")]
    Gtfs,
    #[serde(rename = "TM")]
    Tm,
    #[serde(rename = "JOIN")]
    Join,
}

impl Provenance {
    pub fn of(gtfs_stop_sequence: Option<u32>, tm_stop_sequence: Option<u32>) -> Self {
        match (gtfs_stop_sequence, tm_stop_sequence) {
            (_, None) => Provenance::Gtfs,
            (None, Some(_)) => Provenance::Tm,
            (Some(_), Some(_)) => Provenance::Join,
        }
    }
}

/// Position of a row within its schedule skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointType {
    Start,
    Mid,
    End,
}

/// The merged schedule skeleton: one row per (trip, stop visit, pullout).
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedScheduleRow {
    pub trip_id: String,
    pub trip_id_gtfs: Option<String>,
    pub tm_pullout_id: Option<i64>,
    /// Canonical position, 1-based within (trip_id, tm_pullout_id).
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

    // trip-constant attributes, filled across the partition
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
}

impl CombinedScheduleRow {
    /// The best-known scheduled departure, GTFS first.
    pub fn scheduled_departure(&self) -> Option<DateTime<Utc>> {
        self.plan_stop_departure_dt.or(self.tm_stop_departure_dt)
    }
}
