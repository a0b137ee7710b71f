//! Error taxonomy for one service-date computation.
//!
//! Integrity and read failures are fatal for the date and surface as
//! [`PipelineError`]. Invariant violations are not errors at all: they become
//! [`crate::metrics::RejectedRow`] records and processing continues.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The static schedules disagree in a way that cannot be reconciled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataIntegrityError {
    /// A TM pullout has no GTFS departure within its window for the same trip.
    #[error(
        "TM pullout {pullout_id} of trip {trip_id} has no GTFS departure candidates \
         between {window_start} and {window_end}"
    )]
    NoCandidates {
        trip_id: String,
        pullout_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    /// A TM pullout row is missing every scheduled time, so no window exists.
    #[error("TM pullout {pullout_id} of trip {trip_id} has no scheduled departures")]
    EmptyPullout { trip_id: String, pullout_id: i64 },
}

/// An upstream table could not be read or decoded.
#[derive(Error, Debug)]
pub enum SourceReadError {
    #[error("failed to read '{location}'")]
    Unreadable {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("impossible to gunzip '{location}'")]
    Gunzip {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("impossible to decode csv table '{location}'")]
    Decode {
        location: String,
        #[source]
        source: csv::Error,
    },
}

/// The pipeline configuration is unusable.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'{0}' is not a known IANA timezone")]
    InvalidTimezone(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("impossible to read config file '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("impossible to parse config file '{path}'")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that aborts a service date. Nothing is published when one of
/// these is returned.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
    #[error(transparent)]
    SourceRead(#[from] SourceReadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("impossible to publish output to '{path}'")]
    Publish {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
