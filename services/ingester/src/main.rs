//! Ocean driver ingester.
//!
//! Runs one ingestion request per invocation: fetches an ERDDAP subset for
//! a source, region and period, stages it, validates the decoded rows and
//! replaces the matching warehouse partition. Exits non-zero on failure.

mod config;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use ingestion::{
    Ingester, IngestionRequest, LoadMode, RemoteDataClient, RunRecorder, WarehouseLoader,
};
use ocean_common::{Period, SourceKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storage::StagingWriter;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use config::IngesterConfig;

/// First year of the OISST v2.1 record; no source has data before it.
const EARLIEST_YEAR: i32 = 1981;

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Gridded ocean data ingester (ERDDAP to warehouse)")]
struct Args {
    /// Source to ingest: sst, chl or waves
    #[arg(long)]
    source: SourceKind,

    /// Region id from the config's region catalog
    #[arg(long)]
    region_id: String,

    /// Calendar year (with --month)
    #[arg(long, requires = "month", conflicts_with_all = ["start", "end"])]
    year: Option<i32>,

    /// Calendar month 1-12 (with --year)
    #[arg(long, requires = "year")]
    month: Option<u32>,

    /// First day of the period, YYYY-MM-DD (with --end)
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// Last day of the period, inclusive, YYYY-MM-DD (with --start)
    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Load mode: dry-run or replace
    #[arg(long, default_value = "replace")]
    mode: LoadMode,

    /// Ignore a valid staged file and download again
    #[arg(long)]
    force_download: bool,

    /// Configuration file path
    #[arg(short, long, env = "INGESTER_CONFIG", default_value = "config/ingester.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on this address while the run lasts
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Args {
    fn period(&self) -> Result<Period> {
        match (self.year, self.month, &self.start, &self.end) {
            (Some(year), Some(month), None, None) => {
                check_year(year)?;
                Ok(Period::month(year, month)?)
            }
            (None, None, Some(start), Some(end)) => {
                let period = Period::parse(start, end)?;
                check_year(period.start.year())?;
                Ok(period)
            }
            _ => bail!("Give either --year and --month, or --start and --end"),
        }
    }

    fn request(&self) -> Result<IngestionRequest> {
        Ok(IngestionRequest::new(self.source, &self.region_id, self.period()?)
            .with_mode(self.mode)
            .force_download(self.force_download))
    }
}

fn check_year(year: i32) -> Result<()> {
    let current = Utc::now().year();
    if !(EARLIEST_YEAR..=current).contains(&year) {
        bail!("Year {} outside {}..={}", year, EARLIEST_YEAR, current);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(addr) = args.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(addr = %addr, "Prometheus metrics exporter initialized");
    }

    netcdf_parser::silence_hdf5_errors();

    let request = args.request()?;
    let config = IngesterConfig::load(&args.config)?;
    info!(
        config = %args.config.display(),
        regions = ?config.regions.ids().collect::<Vec<_>>(),
        "Loaded configuration"
    );

    let ingester = build_ingester(config).await?;

    match ingester.run(&request).await {
        Ok(result) => {
            info!(
                run_id = %result.run.run_id,
                rows_written = result.rows_written,
                artifacts = result.artifacts.len(),
                "Ingestion completed"
            );
            Ok(())
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Ingestion failed");
            Err(e.into())
        }
    }
}

async fn build_ingester(config: IngesterConfig) -> Result<Ingester> {
    let settings = config.settings;

    let store = settings
        .staging
        .build()
        .context("Failed to create staging store")?;
    let staging = StagingWriter::new(store).with_min_bytes(settings.fetch.min_bytes);

    let handles = settings.warehouse.connect().await?;
    let client = RemoteDataClient::http(&settings.fetch)?;

    Ok(Ingester::new(
        Arc::new(config.regions),
        Arc::new(config.sources),
        client,
        staging,
        WarehouseLoader::new(handles.warehouse, settings.load.timeout()),
        RunRecorder::new(handles.audit),
    )
    .with_validation(settings.validation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_request() {
        let args = Args::parse_from([
            "ingester", "--source", "sst", "--region-id", "NTT", "--year", "2001", "--month", "1",
            "--mode", "dry-run",
        ]);
        let request = args.request().unwrap();
        assert_eq!(request.source, SourceKind::Sst);
        assert_eq!(request.period, Period::month(2001, 1).unwrap());
        assert_eq!(request.mode, LoadMode::DryRun);
        assert!(!request.force_download);
    }

    #[test]
    fn test_explicit_range_request() {
        let args = Args::parse_from([
            "ingester", "--source", "chl", "--region-id", "NTT", "--start", "2010-03-01", "--end",
            "2010-03-31", "--force-download",
        ]);
        let request = args.request().unwrap();
        assert_eq!(request.period.num_days(), 31);
        assert_eq!(request.mode, LoadMode::Replace);
        assert!(request.force_download);
    }

    #[test]
    fn test_rejects_mixed_period_flags() {
        let parsed = Args::try_parse_from([
            "ingester", "--source", "sst", "--region-id", "NTT", "--year", "2001", "--month", "1",
            "--start", "2001-01-01", "--end", "2001-01-31",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_rejects_missing_period() {
        let args = Args::parse_from(["ingester", "--source", "waves", "--region-id", "NTT"]);
        assert!(args.request().is_err());
    }

    #[test]
    fn test_rejects_implausible_year() {
        let args = Args::parse_from([
            "ingester", "--source", "sst", "--region-id", "NTT", "--year", "1900", "--month", "1",
        ]);
        assert!(args.request().is_err());
    }
}
