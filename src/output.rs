//! Persistence of one service date's results.
//!
//! A date directory holds `bus_performance_metrics.csv`,
//! `rejected_rows.jsonl` and `summary.json`. All three are written to a
//! staging directory first and renamed into place together.

use csv::WriterBuilder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::metrics::{BusPerformanceMetrics, RejectedRow};
use crate::pipeline::{DateSummary, ServiceDateOutput};

pub const METRICS_FILE: &str = "bus_performance_metrics.csv";
pub const REJECTED_FILE: &str = "rejected_rows.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

/// Writes metrics as CSV with a header row. Nothing is written for no rows.
pub fn write_metrics_csv<W: Write>(writer: W, rows: &[BusPerformanceMetrics]) -> io::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()
}

/// Writes one JSON object per rejected row: `{"rule": ..., "row": {...}}`.
pub fn write_rejected_jsonl<W: Write>(mut writer: W, rejected: &[RejectedRow]) -> io::Result<()> {
    for row in rejected {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// The directory a service date is published to.
pub fn date_dir(output_dir: &Path, summary: &DateSummary) -> PathBuf {
    output_dir.join(format!(
        "service_date={}",
        summary.service_date.format("%Y-%m-%d")
    ))
}

/// Publishes a service date under `output_dir`, replacing any earlier run.
///
/// Returns the published directory. On failure the earlier publication, if
/// any, is left in place.
#[tracing::instrument(skip(output), fields(service_date = %output.summary.service_date))]
pub fn publish(output_dir: &Path, output: &ServiceDateOutput) -> Result<PathBuf, PipelineError> {
    let target = date_dir(output_dir, &output.summary);
    let date = output.summary.service_date.format("%Y-%m-%d");
    let staging = output_dir.join(format!(".service_date={date}.tmp"));
    let previous = output_dir.join(format!(".service_date={date}.old"));
    let publish_err = |source: io::Error| PipelineError::Publish {
        path: target.display().to_string(),
        source,
    };

    if let Err(e) = write_staging(&staging, output) {
        let _ = fs::remove_dir_all(&staging);
        return Err(publish_err(e));
    }
    if let Err(e) = swap_into_place(&staging, &target, &previous) {
        let _ = fs::remove_dir_all(&staging);
        return Err(publish_err(e));
    }

    info!(
        path = %target.display(),
        published = output.summary.published,
        rejected = output.summary.rejected,
        "Service date published"
    );
    Ok(target)
}

/// Moves `staging` to `target`. An existing `target` is first moved to
/// `previous` and restored if the second rename fails.
fn swap_into_place(staging: &Path, target: &Path, previous: &Path) -> io::Result<()> {
    // an interrupted swap leaves the last publication at `previous`
    if previous.exists() {
        if target.exists() {
            fs::remove_dir_all(previous)?;
        } else {
            warn!(path = %previous.display(), "Restoring interrupted publication");
            fs::rename(previous, target)?;
        }
    }

    let replacing = target.exists();
    if replacing {
        debug!(path = %target.display(), "Replacing earlier publication");
        fs::rename(target, previous)?;
    }
    if let Err(e) = fs::rename(staging, target) {
        if replacing {
            fs::rename(previous, target)?;
        }
        return Err(e);
    }
    if replacing {
        fs::remove_dir_all(previous).unwrap_or_else(|e| {
            warn!(path = %previous.display(), error = %e, "Earlier publication not removed")
        });
    }
    Ok(())
}

fn write_staging(staging: &Path, output: &ServiceDateOutput) -> io::Result<()> {
    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;

    write_metrics_csv(
        BufWriter::new(File::create(staging.join(METRICS_FILE))?),
        &output.metrics,
    )?;
    write_rejected_jsonl(
        BufWriter::new(File::create(staging.join(REJECTED_FILE))?),
        &output.rejected,
    )?;

    let mut summary = BufWriter::new(File::create(staging.join(SUMMARY_FILE))?);
    serde_json::to_writer_pretty(&mut summary, &output.summary)?;
    summary.write_all(b"\n")?;
    summary.flush()
}
