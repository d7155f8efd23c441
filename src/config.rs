//! Runtime configuration for the ETL pipeline.
//!
//! Everything that used to be a module-level constant in earlier drafts lives
//! here so tests can point the pipeline at a fixture CSV and a temp database
//! without touching process state.

use std::path::PathBuf;
use std::time::Duration;

/// OWID grapher export, short column names, full CSV.
pub const DEFAULT_SOURCE_URL: &str =
    "https://ourworldindata.org/grapher/global-vaccination-coverage.csv?v=1&csvType=full&useColumnShortNames=true";

/// Column name prefix marking an antigen coverage column in the upstream CSV.
pub const COVERAGE_PREFIX: &str = "coverage__";

#[derive(Debug, Clone)]
pub struct Config {
    /// URL (or local path, see the CLI) of the upstream coverage CSV.
    pub source_url: String,
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    /// Table holding the upstream wide schema verbatim.
    pub raw_table: String,
    /// Table holding the normalized (country, antigen, year) rows.
    pub clean_table: String,
    /// Fetch timeout; elapsing is a fatal fetch error, no retry.
    pub fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            db_path: PathBuf::from("vaccination.db"),
            raw_table: "owid_raw".to_string(),
            clean_table: "immunization".to_string(),
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Defaults with `VAXCOV_SOURCE_URL` / `VAXCOV_DB_PATH` overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("VAXCOV_SOURCE_URL") {
            cfg.source_url = url;
        }
        if let Ok(path) = std::env::var("VAXCOV_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        cfg
    }
}
