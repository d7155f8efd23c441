//! CLI entry point for the vaccination coverage ETL & analysis tool.
//!
//! Provides subcommands for refreshing the local database from the OWID
//! export, running a before/after campaign comparison for one
//! (country, antigen) pair, and listing the pairs available in the store.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use vaxcov_etl::analysis::{AnalysisRequest, run_analysis};
use vaxcov_etl::config::Config;
use vaxcov_etl::fetch::{BasicClient, fetch_csv};
use vaxcov_etl::store::{RefreshMeta, Store};
use vaxcov_etl::transform::transform;

#[derive(Parser)]
#[command(name = "vaxcov_etl")]
#[command(about = "Vaccination coverage ETL and campaign analysis", long_about = None)]
struct Cli {
    /// Override the SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the coverage CSV and rebuild the local database
    Refresh {
        /// Source override: a URL or a local CSV file path
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Refresh, then compare coverage before and after a campaign year
    Analyze {
        /// Country to analyze (source-controlled spelling, e.g. "Angola")
        #[arg(value_name = "COUNTRY")]
        country: String,

        /// Antigen code to analyze (e.g. "mcv1")
        #[arg(value_name = "ANTIGEN")]
        antigen: String,

        /// Campaign start year
        #[arg(long, default_value_t = 2017)]
        campaign_year: i64,

        /// Years before the campaign
        #[arg(long, default_value_t = 5)]
        pre_years: i64,

        /// Years after the campaign
        #[arg(long, default_value_t = 5)]
        post_years: i64,

        /// Directory for the CSV and plot artifacts
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Source override: a URL or a local CSV file path
        #[arg(short, long)]
        source: Option<String>,

        /// Analyze the existing database without refreshing it first
        #[arg(long, default_value_t = false)]
        skip_refresh: bool,
    },
    /// List the (country, antigen) pairs present in the database
    ListPairs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/vaxcov_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("vaxcov_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Refresh { source } => {
            run_etl(&config, source.as_deref()).await?;
        }
        Commands::Analyze {
            country,
            antigen,
            campaign_year,
            pre_years,
            post_years,
            out_dir,
            source,
            skip_refresh,
        } => {
            if skip_refresh {
                info!("Skipping refresh, analyzing the existing database");
            } else {
                run_etl(&config, source.as_deref()).await?;
            }

            run_analysis(
                &config,
                &AnalysisRequest {
                    country: &country,
                    antigen: &antigen,
                    campaign_year,
                    pre_years,
                    post_years,
                },
                &out_dir,
            )?;
        }
        Commands::ListPairs => {
            let store = Store::open(&config)?;
            let pairs = store.distinct_pairs()?;
            for (country, antigen) in &pairs {
                info!(country = %country, antigen = %antigen, "Pair");
            }
            info!(total = pairs.len(), "Pairs available");
            if let Some(meta) = store.last_refresh()? {
                info!(refreshed_at = %meta.refreshed_at, source = %meta.source, "Last refresh");
            }
        }
    }

    Ok(())
}

/// Loads the coverage CSV from a local file path or fetches it over HTTP.
#[tracing::instrument(skip(timeout), fields(source = %source))]
async fn load_source(source: &str, timeout: Duration) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = BasicClient::new();
        fetch_csv(&client, source, timeout).await?
    } else {
        std::fs::read(source)?
    };
    Ok(bytes)
}

/// Fetch, reshape, and replace both database tables.
///
/// The database is only touched after the transform succeeds, so a fetch or
/// parse failure leaves the previous snapshot intact.
async fn run_etl(config: &Config, source_override: Option<&str>) -> Result<()> {
    let source = source_override.unwrap_or(&config.source_url);

    info!(source, "Extract: downloading coverage CSV");
    let bytes = load_source(source, config.fetch_timeout).await?;

    info!("Transform: reshaping dataset");
    let (raw, records) = transform(&bytes)?;

    info!(db = %config.db_path.display(), "Load: writing to SQLite");
    let mut store = Store::open(config)?;
    let raw_rows = store.replace_raw(&raw)?;
    let coverage_rows = store.replace_coverage(&records)?;
    store.record_refresh(&RefreshMeta {
        refreshed_at: Utc::now(),
        source: source.to_string(),
        raw_rows,
        coverage_rows,
    })?;

    info!(raw_rows, coverage_rows, "ETL complete, database refreshed");
    Ok(())
}

