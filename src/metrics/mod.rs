//! Reconciled stop times, durations and headways, plus the invariant checks
//! that gate publication.

mod derive;
mod headway;
pub mod types;
mod validate;

pub use derive::{derive_metrics, derive_partition};
pub use headway::apply_headways;
pub use types::BusPerformanceMetrics;
pub use validate::{RejectedRow, ValidationOutcome, ValidationRule, validate};
