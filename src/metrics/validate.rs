//! Invariant checks on derived metrics.
//!
//! A failed invariant never aborts the date. The offending rows are moved to
//! the rejected set with the rule they broke and everything else is published.
//! Partition rules are checked after row rejections, so a partition that no
//! longer adds up once a row is withheld is withheld as a whole.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::metrics::types::BusPerformanceMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// Present GTFS stop sequences strictly increase in stop order.
    GtfsStopSequenceIncreasing,
    /// A partition with any GTFS stop starts on one.
    FirstStopHasGtfs,
    DepartureNotBeforeArrival,
    ArrivalNonDecreasing,
    DepartureNonDecreasing,
    /// Travel plus dwell time adds up to the first arrival to last departure span.
    DurationSumMatchesSpan,
}

impl ValidationRule {
    pub fn name(&self) -> &'static str {
        match self {
            ValidationRule::GtfsStopSequenceIncreasing => "gtfs_stop_sequence_increasing",
            ValidationRule::FirstStopHasGtfs => "first_stop_has_gtfs",
            ValidationRule::DepartureNotBeforeArrival => "departure_not_before_arrival",
            ValidationRule::ArrivalNonDecreasing => "arrival_non_decreasing",
            ValidationRule::DepartureNonDecreasing => "departure_non_decreasing",
            ValidationRule::DurationSumMatchesSpan => "duration_sum_matches_span",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A row withheld from publication and the first rule it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub rule: ValidationRule,
    pub row: BusPerformanceMetrics,
}

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<BusPerformanceMetrics>,
    pub rejected: Vec<RejectedRow>,
}

/// Splits `rows` into publishable and rejected rows.
///
/// `rows` must be grouped by (trip_id, vehicle_label) and in stop order within
/// each group.
#[tracing::instrument(skip_all, fields(rows = rows.len()))]
pub fn validate(rows: Vec<BusPerformanceMetrics>) -> ValidationOutcome {
    let mut verdicts: Vec<Option<ValidationRule>> = vec![None; rows.len()];

    let mut start = 0;
    for partition in rows.chunk_by(|a, b| a.partition_key() == b.partition_key()) {
        let end = start + partition.len();
        let partition_verdicts = &mut verdicts[start..end];

        for (verdict, rule) in partition_verdicts.iter_mut().zip(row_rules(partition)) {
            *verdict = rule;
        }
        // partition rules hold over what would be published
        let survivors: Vec<&BusPerformanceMetrics> = partition
            .iter()
            .zip(partition_verdicts.iter())
            .filter(|(_, verdict)| verdict.is_none())
            .map(|(row, _)| row)
            .collect();
        if let Some(rule) = partition_rule(&survivors) {
            warn!(
                trip_id = %partition[0].trip_id,
                vehicle_label = %partition[0].vehicle_label,
                rule = %rule,
                "Partition failed validation"
            );
            for verdict in partition_verdicts.iter_mut().filter(|v| v.is_none()) {
                *verdict = Some(rule);
            }
        }
        start = end;
    }

    let mut outcome = ValidationOutcome::default();
    for (row, verdict) in rows.into_iter().zip(verdicts) {
        match verdict {
            None => outcome.valid.push(row),
            Some(rule) => outcome.rejected.push(RejectedRow { rule, row }),
        }
    }
    outcome
}

fn row_rules(partition: &[BusPerformanceMetrics]) -> Vec<Option<ValidationRule>> {
    let mut last_gtfs_sequence: Option<u32> = None;
    let mut last_arrival: Option<DateTime<Utc>> = None;
    let mut last_departure: Option<DateTime<Utc>> = None;

    partition
        .iter()
        .map(|row| {
            let sequence_regressed = matches!(
                (last_gtfs_sequence, row.gtfs_stop_sequence),
                (Some(prev), Some(seq)) if seq <= prev
            );
            let departs_before_arrival = matches!(
                (row.stop_arrival_dt, row.stop_departure_dt),
                (Some(arr), Some(dep)) if dep < arr
            );
            let arrival_regressed = regressed(last_arrival, row.stop_arrival_dt);
            let departure_regressed = regressed(last_departure, row.stop_departure_dt);

            last_gtfs_sequence = row.gtfs_stop_sequence.or(last_gtfs_sequence);
            last_arrival = row.stop_arrival_dt.or(last_arrival);
            last_departure = row.stop_departure_dt.or(last_departure);

            if sequence_regressed {
                Some(ValidationRule::GtfsStopSequenceIncreasing)
            } else if departs_before_arrival {
                Some(ValidationRule::DepartureNotBeforeArrival)
            } else if arrival_regressed {
                Some(ValidationRule::ArrivalNonDecreasing)
            } else if departure_regressed {
                Some(ValidationRule::DepartureNonDecreasing)
            } else {
                None
            }
        })
        .collect()
}

fn regressed(previous: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> bool {
    matches!((previous, current), (Some(p), Some(c)) if c < p)
}

fn partition_rule(partition: &[&BusPerformanceMetrics]) -> Option<ValidationRule> {
    let has_gtfs = partition.iter().any(|r| r.gtfs_stop_sequence.is_some());
    if has_gtfs && partition.first().is_some_and(|r| r.gtfs_stop_sequence.is_none()) {
        return Some(ValidationRule::FirstStopHasGtfs);
    }

    let first_arrival = partition.iter().find_map(|r| r.stop_arrival_dt);
    let last_departure = partition.iter().rev().find_map(|r| r.stop_departure_dt);
    if let (Some(first), Some(last)) = (first_arrival, last_departure) {
        let total: i64 = partition
            .iter()
            .map(|r| r.travel_time_seconds.unwrap_or(0) + r.stopped_duration_seconds.unwrap_or(0))
            .sum();
        if total != (last - first).num_seconds() {
            return Some(ValidationRule::DurationSumMatchesSpan);
        }
    }
    None
}
