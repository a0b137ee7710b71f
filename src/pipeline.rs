//! One service date, end to end: read the inputs, merge the schedules, pivot
//! the realtime feeds, join, derive and validate.
//!
//! [`reconcile`] is the pure core. [`run_service_date`] adds the async reads
//! in front of it. Publishing the result is [`crate::output::publish`].

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, SourceReadError};
use crate::events::{
    StopCrossing, VehiclePing, continue_split_event_sequences, dedupe_partition_files, gtfs_events,
    tm_events,
};
use crate::join::join_events;
use crate::metrics::{BusPerformanceMetrics, RejectedRow, derive_metrics, validate};
use crate::schedule::{
    GtfsStaticTables, TmStaticTables, bus_route_ids, continue_split_sequences, gtfs_schedule,
    merge_schedules, tm_schedule,
};
use crate::sources::{TableSource, read_table, read_tables};
use crate::time::tm_calendar_id;

/// Every table one service date is computed from.
#[derive(Debug, Clone, Default)]
pub struct ServiceDateInputs {
    pub gtfs: GtfsStaticTables,
    pub tm: TmStaticTables,
    pub stop_crossings: Vec<StopCrossing>,
    pub vehicle_pings: Vec<VehiclePing>,
}

/// Where a service date's tables live, relative to a [`TableSource`] root.
///
/// The expected layout is:
/// ```text
/// gtfs/<table>.csv[.gz]
/// tm/<TABLE>.csv[.gz]
/// tm/STOP_CROSSING/<calendar_id>*.csv[.gz]
/// vehicle_positions/year=YYYY/month=MM/day=DD/[hour=HH/]*.csv[.gz]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputManifest {
    pub gtfs_static_dir: String,
    pub tm_static_dir: String,
    /// `.csv` or `.csv.gz`, shared by all static tables.
    pub static_extension: String,
    pub stop_crossing_files: Vec<String>,
    pub vehicle_position_files: Vec<String>,
}

const GTFS_DIR: &str = "gtfs";
const TM_DIR: &str = "tm";
const STOP_CROSSING_DIR: &str = "tm/STOP_CROSSING";
const VEHICLE_POSITIONS_DIR: &str = "vehicle_positions";

impl InputManifest {
    /// Finds the files for `service_date` under `input_dir`.
    ///
    /// Vehicle positions are taken from the service date and the following
    /// calendar day, since service runs past midnight. Hourly files are
    /// dropped when a full-day file covers the same day.
    pub fn discover(input_dir: &Path, service_date: NaiveDate) -> Result<Self, SourceReadError> {
        let static_extension = if input_dir.join(GTFS_DIR).join("trips.csv.gz").exists() {
            ".csv.gz"
        } else {
            ".csv"
        };

        let calendar_id = tm_calendar_id(service_date).to_string();
        let stop_crossing_files: Vec<String> = list_tables(input_dir, STOP_CROSSING_DIR)?
            .into_iter()
            .filter(|path| {
                path.rsplit('/')
                    .next()
                    .is_some_and(|name| name.starts_with(&calendar_id))
            })
            .collect();

        let days: Vec<String> = [Some(service_date), service_date.succ_opt()]
            .into_iter()
            .flatten()
            .map(|d| d.format("year=%Y/month=%m/day=%d").to_string())
            .collect();
        let mut pings = Vec::new();
        for day in &days {
            pings.extend(list_tables(input_dir, &format!("{VEHICLE_POSITIONS_DIR}/{day}"))?);
        }
        let vehicle_position_files = dedupe_partition_files(&pings);

        debug!(
            stop_crossing_files = stop_crossing_files.len(),
            vehicle_position_files = vehicle_position_files.len(),
            "Inputs discovered"
        );

        Ok(Self {
            gtfs_static_dir: GTFS_DIR.to_string(),
            tm_static_dir: TM_DIR.to_string(),
            static_extension: static_extension.to_string(),
            stop_crossing_files,
            vehicle_position_files,
        })
    }

    fn gtfs_table(&self, name: &str) -> String {
        format!("{}/{}{}", self.gtfs_static_dir, name, self.static_extension)
    }

    fn tm_table(&self, name: &str) -> String {
        format!("{}/{}{}", self.tm_static_dir, name, self.static_extension)
    }
}

/// CSV files anywhere under `root/dir`, as `/`-separated paths relative to
/// `root`, sorted. A missing directory has no files.
fn list_tables(root: &Path, dir: &str) -> Result<Vec<String>, SourceReadError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_string()];

    while let Some(relative) = pending.pop() {
        let path = root.join(&relative);
        if !path.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&path).map_err(|source| SourceReadError::Unreadable {
            location: relative.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| SourceReadError::Unreadable {
                location: relative.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = format!("{relative}/{name}");
            if entry.path().is_dir() {
                pending.push(child);
            } else if name.ends_with(".csv") || name.ends_with(".csv.gz") {
                found.push(child);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// What happened to one service date, written next to its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateSummary {
    pub service_date: NaiveDate,
    pub published: usize,
    pub rejected: usize,
    pub rejected_by_rule: BTreeMap<String, usize>,
    pub schedule_rows: usize,
    pub pullouts: usize,
    pub vehicle_partitions: usize,
    pub unmatched_gtfs_events: usize,
    pub unmatched_tm_events: usize,
    pub ambiguous_matches: usize,
    pub trimmed_schedule_rows: usize,
    pub excluded_schedule_rows: usize,
}

#[derive(Debug)]
pub struct ServiceDateOutput {
    pub metrics: Vec<BusPerformanceMetrics>,
    pub rejected: Vec<RejectedRow>,
    pub summary: DateSummary,
}

/// Computes the metrics of one service date from fully loaded inputs.
///
/// # Errors
///
/// [`PipelineError::Config`] for an unknown timezone and
/// [`PipelineError::DataIntegrity`] when the static schedules cannot be
/// merged. Rows breaking an invariant are not errors; they come back in
/// [`ServiceDateOutput::rejected`].
#[tracing::instrument(skip(inputs, config), fields(service_date = %service_date))]
pub fn reconcile(
    service_date: NaiveDate,
    inputs: &ServiceDateInputs,
    config: &PipelineConfig,
) -> Result<ServiceDateOutput, PipelineError> {
    let tz = config.tz()?;

    let mut gtfs = gtfs_schedule(service_date, &inputs.gtfs, tz);
    let split_offsets = continue_split_sequences(&mut gtfs);
    let tm = tm_schedule(service_date, &inputs.tm, tz);
    let merged = merge_schedules(&gtfs, &tm, Duration::seconds(config.match_tolerance_secs))?;

    let bus_routes = bus_route_ids(&inputs.gtfs.routes);
    let mut gtfs_rt = gtfs_events(service_date, &inputs.vehicle_pings, &bus_routes);
    continue_split_event_sequences(&mut gtfs_rt, &split_offsets);
    let tm_rt = tm_events(service_date, &inputs.stop_crossings, &inputs.tm, tz);

    let joined = join_events(service_date, &merged.rows, &gtfs_rt, &tm_rt);
    let outcome = validate(derive_metrics(&joined.events));

    let mut rejected_by_rule: BTreeMap<String, usize> = BTreeMap::new();
    for rejected in &outcome.rejected {
        *rejected_by_rule.entry(rejected.rule.to_string()).or_default() += 1;
    }

    let summary = DateSummary {
        service_date,
        published: outcome.valid.len(),
        rejected: outcome.rejected.len(),
        rejected_by_rule,
        schedule_rows: merged.rows.len(),
        pullouts: merged.stats.pullouts,
        vehicle_partitions: joined.stats.partitions,
        unmatched_gtfs_events: joined.stats.unmatched_gtfs_events,
        unmatched_tm_events: joined.stats.unmatched_tm_events,
        ambiguous_matches: merged.stats.ambiguous_matches,
        trimmed_schedule_rows: merged.stats.trimmed_tm_rows + joined.stats.trimmed_rows,
        excluded_schedule_rows: merged.stats.excluded_tm_rows,
    };

    info!(
        published = summary.published,
        rejected = summary.rejected,
        unmatched_gtfs = summary.unmatched_gtfs_events,
        unmatched_tm = summary.unmatched_tm_events,
        ambiguous = summary.ambiguous_matches,
        "Service date reconciled"
    );

    Ok(ServiceDateOutput {
        metrics: outcome.valid,
        rejected: outcome.rejected,
        summary,
    })
}

/// Reads every input named by `manifest` through `source`.
#[tracing::instrument(skip_all)]
pub async fn load_inputs<S: TableSource + ?Sized>(
    source: &S,
    manifest: &InputManifest,
) -> Result<ServiceDateInputs, SourceReadError> {
    let pings = dedupe_partition_files(&manifest.vehicle_position_files);

    let (gtfs, tm, stop_crossings, vehicle_pings) = tokio::try_join!(
        load_gtfs_static(source, manifest),
        load_tm_static(source, manifest),
        read_tables::<StopCrossing, _>(source, &manifest.stop_crossing_files),
        read_tables::<VehiclePing, _>(source, &pings),
    )?;

    info!(
        gtfs_stop_times = gtfs.stop_times.len(),
        tm_schedule_stops = tm.schedule_stops.len(),
        stop_crossings = stop_crossings.len(),
        vehicle_pings = vehicle_pings.len(),
        "Inputs loaded"
    );

    Ok(ServiceDateInputs {
        gtfs,
        tm,
        stop_crossings,
        vehicle_pings,
    })
}

async fn load_gtfs_static<S: TableSource + ?Sized>(
    source: &S,
    manifest: &InputManifest,
) -> Result<GtfsStaticTables, SourceReadError> {
    Ok(GtfsStaticTables {
        trips: read_table(source, &manifest.gtfs_table("trips")).await?,
        stop_times: read_table(source, &manifest.gtfs_table("stop_times")).await?,
        routes: read_table(source, &manifest.gtfs_table("routes")).await?,
        directions: read_table(source, &manifest.gtfs_table("directions")).await?,
        route_patterns: read_table(source, &manifest.gtfs_table("route_patterns")).await?,
        stops: read_table(source, &manifest.gtfs_table("stops")).await?,
        calendar: read_table(source, &manifest.gtfs_table("calendar")).await?,
        calendar_dates: read_table(source, &manifest.gtfs_table("calendar_dates")).await?,
    })
}

async fn load_tm_static<S: TableSource + ?Sized>(
    source: &S,
    manifest: &InputManifest,
) -> Result<TmStaticTables, SourceReadError> {
    Ok(TmStaticTables {
        geo_nodes: read_table(source, &manifest.tm_table("GEO_NODE")).await?,
        routes: read_table(source, &manifest.tm_table("ROUTE")).await?,
        trips: read_table(source, &manifest.tm_table("TRIP")).await?,
        vehicles: read_table(source, &manifest.tm_table("VEHICLE")).await?,
        pattern_geo_nodes: read_table(source, &manifest.tm_table("PATTERN_GEO_NODE_XREF")).await?,
        time_points: read_table(source, &manifest.tm_table("TIME_POINT")).await?,
        work_pieces: read_table(source, &manifest.tm_table("DAILY_WORK_PIECE")).await?,
        schedule_stops: read_table(source, &manifest.tm_table("DAILY_SCHEDULE_STOP")).await?,
    })
}

/// Reads and reconciles one service date.
#[tracing::instrument(skip(source, manifest, config), fields(service_date = %service_date))]
pub async fn run_service_date<S: TableSource + ?Sized>(
    source: &S,
    manifest: &InputManifest,
    service_date: NaiveDate,
    config: &PipelineConfig,
) -> Result<ServiceDateOutput, PipelineError> {
    let inputs = load_inputs(source, manifest).await?;
    reconcile(service_date, &inputs, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::env;
    use std::fs;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 12).unwrap()
    }

    #[test]
    fn test_discover_finds_date_partitions() {
        let root = env::temp_dir().join("bus_performance_discover");
        let _ = fs::remove_dir_all(&root);
        for dir in [
            "gtfs",
            "tm/STOP_CROSSING",
            "vehicle_positions/year=2024/month=06/day=12",
            "vehicle_positions/year=2024/month=06/day=13/hour=01",
            "vehicle_positions/year=2024/month=06/day=14",
        ] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for file in [
            "gtfs/trips.csv",
            "tm/STOP_CROSSING/120240612.csv",
            "tm/STOP_CROSSING/120240611.csv",
            "vehicle_positions/year=2024/month=06/day=12/positions.csv",
            "vehicle_positions/year=2024/month=06/day=13/hour=01/positions.csv.gz",
            "vehicle_positions/year=2024/month=06/day=14/positions.csv",
        ] {
            fs::write(root.join(file), b"").unwrap();
        }

        let manifest = InputManifest::discover(&root, date()).unwrap();
        assert_eq!(manifest.static_extension, ".csv");
        assert_eq!(manifest.stop_crossing_files, vec!["tm/STOP_CROSSING/120240612.csv"]);
        assert_eq!(
            manifest.vehicle_position_files,
            vec![
                "vehicle_positions/year=2024/month=06/day=12/positions.csv",
                "vehicle_positions/year=2024/month=06/day=13/hour=01/positions.csv.gz",
            ]
        );
        assert_eq!(manifest.gtfs_table("trips"), "gtfs/trips.csv");

        fs::remove_dir_all(&root).unwrap();
    }

    struct Empty;

    #[async_trait]
    impl TableSource for Empty {
        async fn read(&self, location: &str) -> std::io::Result<Vec<u8>> {
            if location.contains("stop_times") {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, location))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn test_missing_table_aborts_the_date() {
        let manifest = InputManifest {
            gtfs_static_dir: "gtfs".into(),
            tm_static_dir: "tm".into(),
            static_extension: ".csv".into(),
            stop_crossing_files: vec![],
            vehicle_position_files: vec![],
        };
        let result = run_service_date(&Empty, &manifest, date(), &PipelineConfig::default()).await;
        match result {
            Err(PipelineError::SourceRead(SourceReadError::Unreadable { location, .. })) => {
                assert_eq!(location, "gtfs/stop_times.csv")
            }
            other => panic!("expected an unreadable table, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_inputs_publish_nothing() {
        let output =
            reconcile(date(), &ServiceDateInputs::default(), &PipelineConfig::default()).unwrap();
        assert!(output.metrics.is_empty());
        assert!(output.rejected.is_empty());
        assert_eq!(output.summary.published, 0);
    }

    #[test]
    fn test_bad_timezone_is_a_config_error() {
        let config = PipelineConfig {
            timezone: "Mars/Olympus_Mons".into(),
            ..PipelineConfig::default()
        };
        let result = reconcile(date(), &ServiceDateInputs::default(), &config);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
