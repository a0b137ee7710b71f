pub mod config;
pub mod error;
pub mod events;
pub mod fill;
pub mod join;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod schedule;
pub mod sources;
pub mod time;
pub mod trip_id;
