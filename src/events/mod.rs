//! Realtime event extraction from GTFS-RT vehicle positions and
//! TransitMaster stop crossings. Both extractors are independent of the
//! static schedule merge.

mod gtfs;
mod tm;
pub mod types;

pub use gtfs::{StopStatus, continue_split_event_sequences, dedupe_partition_files, gtfs_events};
pub use tm::tm_events;
pub use types::{GtfsRealtimeEvent, StopCrossing, TmRealtimeEvent, VehiclePing};
