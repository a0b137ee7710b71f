//! CLI entry point for the bus performance reconciliation engine.
//!
//! Provides subcommands for computing a single service date and for
//! backfilling a range of dates concurrently.

use anyhow::{Result, bail};
use bus_performance::config::PipelineConfig;
use bus_performance::output::publish;
use bus_performance::pipeline::{InputManifest, run_service_date};
use bus_performance::sources::{LocalSource, Retrying};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bus_performance")]
#[command(about = "Reconciles GTFS and TransitMaster bus data into per-stop metrics", long_about = None)]
struct Cli {
    /// JSON config file; BUS_PERF_* variables are used when absent
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and publish one service date
    Process {
        /// Service date (YYYY-MM-DD)
        #[arg(long)]
        service_date: NaiveDate,

        /// Directory holding the gtfs/, tm/ and vehicle_positions/ inputs
        #[arg(short, long, default_value = "data")]
        input_dir: PathBuf,

        /// Directory receiving service_date=YYYY-MM-DD/ outputs
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Compute and publish every service date in an inclusive range
    Backfill {
        /// First service date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last service date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        #[arg(short, long, default_value = "data")]
        input_dir: PathBuf,

        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Maximum number of dates computed at once (overrides the config)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bus_performance.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bus_performance.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::from_env()?,
    };

    match cli.command {
        Commands::Process {
            service_date,
            input_dir,
            output_dir,
        } => {
            let source = Retrying::new(
                LocalSource::new(&input_dir),
                config.read_attempts,
                config.read_backoff(),
            );
            process_date(&source, &input_dir, &output_dir, service_date, &config).await?;
        }
        Commands::Backfill {
            start,
            end,
            input_dir,
            output_dir,
            concurrency,
        } => {
            let concurrency = concurrency.unwrap_or(config.concurrency);
            backfill(start, end, input_dir, output_dir, concurrency, config).await?;
        }
    }

    Ok(())
}

/// Discovers, computes and publishes one service date.
async fn process_date(
    source: &Retrying<LocalSource>,
    input_dir: &Path,
    output_dir: &Path,
    service_date: NaiveDate,
    config: &PipelineConfig,
) -> Result<PathBuf> {
    let manifest = InputManifest::discover(input_dir, service_date)?;
    let output = run_service_date(source, &manifest, service_date, config).await?;
    std::fs::create_dir_all(output_dir)?;
    Ok(publish(output_dir, &output)?)
}

/// Computes every date in `start..=end`, at most `concurrency` at a time.
/// A failed date is logged and does not stop the others.
#[tracing::instrument(skip(input_dir, output_dir, config), fields(start = %start, end = %end))]
async fn backfill(
    start: NaiveDate,
    end: NaiveDate,
    input_dir: PathBuf,
    output_dir: PathBuf,
    concurrency: usize,
    config: PipelineConfig,
) -> Result<()> {
    if end < start {
        bail!("backfill range ends ({end}) before it starts ({start})");
    }

    let source = Arc::new(Retrying::new(
        LocalSource::new(&input_dir),
        config.read_attempts,
        config.read_backoff(),
    ));
    let config = Arc::new(config);
    let input_dir = Arc::new(input_dir);
    let output_dir = Arc::new(output_dir);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));

    let mut tasks = vec![];

    for service_date in start.iter_days().take_while(|d| *d <= end) {
        let sem = semaphore.clone();
        let source = source.clone();
        let config = config.clone();
        let input_dir = input_dir.clone();
        let output_dir = output_dir.clone();

        let date_span = tracing::info_span!("service_date", service_date = %service_date);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire().await?;
                let path =
                    process_date(&source, &input_dir, &output_dir, service_date, &config).await?;
                anyhow::Ok(path)
            }
            .instrument(date_span),
        );
        tasks.push((service_date, task));
    }

    let total = tasks.len();
    let mut failed = 0;

    // Wait for all tasks to complete
    for (service_date, task) in tasks {
        match task.await {
            Ok(Ok(path)) => {
                info!(service_date = %service_date, path = %path.display(), "Service date done")
            }
            Ok(Err(e)) => {
                failed += 1;
                error!(service_date = %service_date, error = %e, "Service date failed");
            }
            Err(e) => {
                failed += 1;
                error!(service_date = %service_date, error = %e, "Service date task panicked");
            }
        }
    }

    info!(total, failed, "Backfill finished");
    if failed > 0 {
        bail!("{failed} of {total} service dates failed");
    }
    Ok(())
}
