//! One analysis invocation: query the store, compare the windows, export.
//!
//! Shared by the CLI so front ends stay thin adapters. Read-only against the
//! database, so running it over an existing snapshot (no refresh in between)
//! gives the same outcome as a fresh run over the same data.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::compare::{Comparison, ComparisonResult, compare};
use crate::config::Config;
use crate::report::{plot_path, print_pretty, render_plot, series_csv_path, write_series_csv};
use crate::store::Store;

/// Parameters of one before/after comparison.
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    pub country: &'a str,
    pub antigen: &'a str,
    pub campaign_year: i64,
    pub pre_years: i64,
    pub post_years: i64,
}

/// What one invocation produced. An empty series and under-populated windows
/// are valid outcomes surfaced as notices, not errors.
#[derive(Debug)]
pub enum AnalysisOutcome {
    NoData,
    InsufficientData {
        before_n: usize,
        after_n: usize,
    },
    Computed {
        result: ComparisonResult,
        series: Vec<(i64, f64)>,
        csv_path: PathBuf,
        plot_path: PathBuf,
    },
}

/// Queries the persisted series for the requested pair, compares the windows,
/// and writes the CSV and plot artifacts under `out_dir` when a result was
/// computed.
pub fn run_analysis(
    config: &Config,
    request: &AnalysisRequest<'_>,
    out_dir: &Path,
) -> Result<AnalysisOutcome> {
    let store = Store::open(config)?;
    let series = store.query_coverage(request.country, request.antigen)?;

    if series.is_empty() {
        warn!(
            country = request.country,
            antigen = request.antigen,
            "No data found for this pair"
        );
        return Ok(AnalysisOutcome::NoData);
    }

    match compare(
        &series,
        request.campaign_year,
        request.pre_years,
        request.post_years,
    ) {
        Comparison::InsufficientData { before_n, after_n } => {
            warn!(
                before_n,
                after_n, "Not enough data points for a before/after t-test"
            );
            Ok(AnalysisOutcome::InsufficientData { before_n, after_n })
        }
        Comparison::Computed(result) => {
            print_pretty(&result, request.country, request.antigen);

            std::fs::create_dir_all(out_dir)?;

            let csv = series_csv_path(out_dir, request.country, request.antigen);
            write_series_csv(&csv, &series)?;
            info!(path = %csv.display(), "Saved raw series");

            let png = plot_path(out_dir, request.country, request.antigen);
            render_plot(
                &png,
                &series,
                request.country,
                request.antigen,
                request.campaign_year,
                request.pre_years,
                request.post_years,
            )?;
            info!(path = %png.display(), "Saved plot");

            Ok(AnalysisOutcome::Computed {
                result,
                series,
                csv_path: csv,
                plot_path: png,
            })
        }
    }
}
