//! Full outer join of the GTFS and TransitMaster static schedules.
//!
//! Each TM pullout of a trip is merged against the whole GTFS trip on
//! `(canonical trip_id, stop_id)`. A stop id can recur within a trip (loop
//! routes), so a TM row is matched to the GTFS visit with the nearest
//! scheduled departure, ties going to the smallest stop-sequence delta.
//! Matches are kept monotone in both sequences.
//!
//! The TM sequence is the superset ordering because it carries non-revenue
//! timepoints. GTFS-only rows are slotted in by carrying the TM sequence of
//! the nearest matched GTFS row forward (then backward) along GTFS order.

use chrono::Duration;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::types::{CombinedScheduleRow, GtfsScheduleStop, PointType, Provenance, TmScheduleStop};
use crate::error::DataIntegrityError;
use crate::fill::{fill_both, fill_column};

/// Counters describing what the merge had to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeStats {
    pub pullouts: usize,
    pub ambiguous_matches: usize,
    /// TM-only rows ahead of a trip's first GTFS stop.
    pub trimmed_tm_rows: usize,
    /// TM rows of trips absent from the GTFS schedule on this date.
    pub excluded_tm_rows: usize,
}

#[derive(Debug, Default)]
pub struct MergedSchedule {
    /// Ordered by (trip_id, tm_pullout_id, stop_sequence).
    pub rows: Vec<CombinedScheduleRow>,
    pub stats: MergeStats,
}

/// Merges both static schedules into the combined skeleton.
///
/// `gtfs` must be ordered per trip as [`super::gtfs_schedule`] returns it.
///
/// # Errors
///
/// [`DataIntegrityError`] when a pullout of a trip known to GTFS has no GTFS
/// departure within `match_tolerance` of its own departure window.
#[tracing::instrument(skip_all, fields(gtfs_rows = gtfs.len(), tm_rows = tm.len()))]
pub fn merge_schedules(
    gtfs: &[GtfsScheduleStop],
    tm: &[TmScheduleStop],
    match_tolerance: Duration,
) -> Result<MergedSchedule, DataIntegrityError> {
    let mut gtfs_trips: BTreeMap<&str, Vec<&GtfsScheduleStop>> = BTreeMap::new();
    for row in gtfs {
        gtfs_trips.entry(row.trip_id.as_str()).or_default().push(row);
    }

    let mut tm_trips: BTreeMap<&str, BTreeMap<i64, Vec<&TmScheduleStop>>> = BTreeMap::new();
    for row in tm {
        tm_trips
            .entry(row.trip_id.as_str())
            .or_default()
            .entry(row.tm_pullout_id)
            .or_default()
            .push(row);
    }
    for pullouts in tm_trips.values_mut() {
        for rows in pullouts.values_mut() {
            rows.sort_by_key(|r| r.tm_stop_sequence);
        }
    }

    let mut merged = MergedSchedule::default();

    merged.stats.excluded_tm_rows = tm_trips
        .iter()
        .filter(|(trip_id, _)| !gtfs_trips.contains_key(*trip_id))
        .flat_map(|(_, pullouts)| pullouts.values())
        .map(Vec::len)
        .sum();
    if merged.stats.excluded_tm_rows > 0 {
        info!(
            excluded_tm_rows = merged.stats.excluded_tm_rows,
            "TM rows without a GTFS trip on this date were excluded"
        );
    }

    for (trip_id, gtfs_rows) in &gtfs_trips {
        match tm_trips.get(trip_id) {
            None => {
                let mut rows: Vec<_> = gtfs_rows
                    .iter()
                    .map(|g| combined_row(Some(*g), None, None))
                    .collect();
                finish_partition(&mut rows, &mut merged.stats);
                merged.rows.extend(rows);
            }
            Some(pullouts) => {
                for (pullout_id, tm_rows) in pullouts {
                    merged.stats.pullouts += 1;
                    let mut rows = merge_pullout(
                        trip_id,
                        *pullout_id,
                        gtfs_rows,
                        tm_rows,
                        match_tolerance,
                        &mut merged.stats,
                    )?;
                    finish_partition(&mut rows, &mut merged.stats);
                    merged.rows.extend(rows);
                }
            }
        }
    }

    debug!(
        combined_rows = merged.rows.len(),
        pullouts = merged.stats.pullouts,
        ambiguous = merged.stats.ambiguous_matches,
        trimmed = merged.stats.trimmed_tm_rows,
        "Static schedules merged"
    );
    Ok(merged)
}

/// (departure distance in seconds, stop-sequence delta, GTFS position)
type MatchScore = (i64, i64, usize);

fn match_score(g: &GtfsScheduleStop, t: &TmScheduleStop, position: usize) -> MatchScore {
    let distance = match (g.plan_stop_departure_dt, t.tm_stop_departure_dt) {
        (Some(a), Some(b)) => (a - b).num_seconds().abs(),
        _ => i64::MAX,
    };
    let delta = (i64::from(g.gtfs_stop_sequence) - i64::from(t.tm_stop_sequence)).abs();
    (distance, delta, position)
}

fn merge_pullout(
    trip_id: &str,
    pullout_id: i64,
    gtfs: &[&GtfsScheduleStop],
    tm: &[&TmScheduleStop],
    match_tolerance: Duration,
    stats: &mut MergeStats,
) -> Result<Vec<CombinedScheduleRow>, DataIntegrityError> {
    let departures = tm.iter().filter_map(|t| t.tm_stop_departure_dt);
    let (Some(first), Some(last)) = (departures.clone().min(), departures.max()) else {
        return Err(DataIntegrityError::EmptyPullout {
            trip_id: trip_id.to_string(),
            pullout_id,
        });
    };
    let window_start = first - match_tolerance;
    let window_end = last + match_tolerance;

    let candidate: Vec<bool> = gtfs
        .iter()
        .map(|g| {
            g.plan_stop_departure_dt
                .is_some_and(|d| d >= window_start && d <= window_end)
        })
        .collect();
    if !candidate.contains(&true) {
        return Err(DataIntegrityError::NoCandidates {
            trip_id: trip_id.to_string(),
            pullout_id,
            window_start,
            window_end,
        });
    }

    // greedy in TM order; each GTFS position is used at most once and only
    // after the previously matched one
    let mut matches: Vec<Option<usize>> = vec![None; tm.len()];
    let mut next_free = 0usize;
    for (ti, t) in tm.iter().enumerate() {
        let mut scored: Vec<MatchScore> = (next_free..gtfs.len())
            .filter(|&p| candidate[p] && gtfs[p].stop_id == t.stop_id)
            .map(|p| match_score(gtfs[p], t, p))
            .collect();
        scored.sort_unstable();

        let Some(&(distance, _, position)) = scored.first() else {
            continue;
        };
        if scored.get(1).is_some_and(|s| s.0 == distance) {
            stats.ambiguous_matches += 1;
            warn!(
                trip_id,
                pullout_id,
                stop_id = %t.stop_id,
                tm_stop_sequence = t.tm_stop_sequence,
                gtfs_stop_sequence = gtfs[position].gtfs_stop_sequence,
                "AmbiguousMatchWarning: equal departure distance, resolved by stop-sequence delta"
            );
        }
        matches[ti] = Some(position);
        next_free = position + 1;
    }

    let mut matched = vec![false; gtfs.len()];
    let mut tm_key: Vec<Option<u32>> = vec![None; gtfs.len()];
    for (ti, m) in matches.iter().enumerate() {
        if let Some(p) = *m {
            matched[p] = true;
            tm_key[p] = Some(tm[ti].tm_stop_sequence);
        }
    }
    fill_both(&mut tm_key);

    let mut keyed: Vec<((Option<u32>, Option<usize>), CombinedScheduleRow)> =
        Vec::with_capacity(tm.len() + gtfs.len());
    for (ti, t) in tm.iter().enumerate() {
        let g = matches[ti].map(|p| gtfs[p]);
        keyed.push((
            (Some(t.tm_stop_sequence), matches[ti]),
            combined_row(g, Some(*t), Some(pullout_id)),
        ));
    }
    for (p, g) in gtfs.iter().enumerate().filter(|(p, _)| !matched[*p]) {
        keyed.push(((tm_key[p], Some(p)), combined_row(Some(*g), None, Some(pullout_id))));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

fn combined_row(
    g: Option<&GtfsScheduleStop>,
    t: Option<&TmScheduleStop>,
    tm_pullout_id: Option<i64>,
) -> CombinedScheduleRow {
    let gtfs_stop_sequence = g.map(|g| g.gtfs_stop_sequence);
    let tm_stop_sequence = t.map(|t| t.tm_stop_sequence);

    CombinedScheduleRow {
        trip_id: g
            .map(|g| g.trip_id.clone())
            .or_else(|| t.map(|t| t.trip_id.clone()))
            .unwrap_or_default(),
        trip_id_gtfs: g.map(|g| g.trip_id_gtfs.clone()),
        tm_pullout_id,
        stop_sequence: 0,
        stop_id: g
            .map(|g| g.stop_id.clone())
            .or_else(|| t.map(|t| t.stop_id.clone()))
            .unwrap_or_default(),
        stop_name: g.and_then(|g| g.stop_name.clone()),
        parent_station: g.and_then(|g| g.parent_station.clone()),
        gtfs_stop_sequence,
        tm_stop_sequence,
        provenance: Provenance::of(gtfs_stop_sequence, tm_stop_sequence),
        point_type: PointType::Mid,
        timepoint_id: t.and_then(|t| t.timepoint_id),
        timepoint_abbr: t.and_then(|t| t.timepoint_abbr.clone()),
        timepoint_name: t.and_then(|t| t.timepoint_name.clone()),
        plan_stop_departure_dt: g.and_then(|g| g.plan_stop_departure_dt),
        tm_stop_departure_dt: t.and_then(|t| t.tm_stop_departure_dt),
        route_id: g.map(|g| g.route_id.clone()),
        direction_id: g.map(|g| g.direction_id),
        direction: g.and_then(|g| g.direction.clone()),
        direction_destination: g.and_then(|g| g.direction_destination.clone()),
        service_id: g.map(|g| g.service_id.clone()),
        block_id: g.and_then(|g| g.block_id.clone()),
        route_pattern_id: g.and_then(|g| g.route_pattern_id.clone()),
        tm_pattern_id: t.map(|t| t.tm_pattern_id),
        tm_block_id: t.and_then(|t| t.tm_block_id.clone()),
        tm_run_id: t.and_then(|t| t.tm_run_id.clone()),
    }
}

macro_rules! fill_attributes {
    ($rows:expr, $($field:ident),+ $(,)?) => {
        $(
            fill_column($rows, |r| r.$field.clone(), |r, v| r.$field = v);
        )+
    };
}

/// Trims leading TM-only rows, reconciles trip attributes and numbers the
/// partition.
fn finish_partition(rows: &mut Vec<CombinedScheduleRow>, stats: &mut MergeStats) {
    if let Some(first_gtfs) = rows.iter().position(|r| r.gtfs_stop_sequence.is_some()) {
        if first_gtfs > 0 {
            stats.trimmed_tm_rows += first_gtfs;
            rows.drain(..first_gtfs);
        }
    }

    fill_attributes!(
        rows.as_mut_slice(),
        trip_id_gtfs,
        route_id,
        direction_id,
        direction,
        direction_destination,
        service_id,
        block_id,
        route_pattern_id,
        tm_pattern_id,
        tm_block_id,
        tm_run_id,
    );

    let last = rows.len().saturating_sub(1);
    for (i, row) in rows.iter_mut().enumerate() {
        row.stop_sequence = i as u32 + 1;
        row.point_type = match i {
            0 => PointType::Start,
            i if i == last => PointType::End,
            _ => PointType::Mid,
        };
    }
}
