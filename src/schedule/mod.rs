//! Static schedules: GTFS and TransitMaster stop visits for a service date,
//! and their merge into one combined skeleton per trip and pullout.

mod gtfs;
mod merge;
mod tm;
pub mod types;

pub use gtfs::{
    BUS_ROUTE_TYPE, active_service_ids, bus_route_ids, continue_split_sequences, gtfs_schedule,
};
pub use merge::{MergeStats, MergedSchedule, merge_schedules};
pub use tm::tm_schedule;
pub use types::{
    CombinedScheduleRow, GtfsScheduleStop, GtfsStaticTables, PointType, Provenance,
    TmScheduleStop, TmStaticTables,
};
