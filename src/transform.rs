//! Wide-to-long reshape of the upstream coverage CSV.
//!
//! The upstream table has one row per (Entity, Year) and one `coverage__*`
//! column per antigen. The transform melts those columns into normalized
//! (country, antigen, year, coverage_pct) rows, dropping empty cells and
//! keeping only plausible years.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use crate::config::COVERAGE_PREFIX;

/// Inclusive year range kept in the normalized table.
pub const YEAR_MIN: i64 = 1980;
pub const YEAR_MAX: i64 = 2100;

const ENTITY_COLUMN: &str = "Entity";
const YEAR_COLUMN: &str = "Year";

/// The upstream wide table, header names and cell text preserved verbatim.
/// An empty cell is `None` so it round-trips to SQL NULL.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// One normalized observation: coverage for one antigen in one country-year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub country: String,
    pub antigen: String,
    pub year: i64,
    pub coverage_pct: f64,
}

/// Parses the upstream CSV and melts it into normalized coverage records.
///
/// Antigen names are the `coverage__*` column names with the prefix stripped.
/// Rows with an empty coverage cell are dropped (no data, not zero); years
/// outside [`YEAR_MIN`], [`YEAR_MAX`] are dropped from the normalized output
/// only, as are rows with an empty `Entity` or `Year` cell. The raw table
/// keeps every row and column as published.
///
/// # Errors
///
/// Fails if the CSV is malformed, if the `Entity` or `Year` column is
/// missing, or if a non-empty `Year` or coverage cell holds non-numeric text.
pub fn transform(bytes: &[u8]) -> Result<(RawTable, Vec<CoverageRecord>)> {
    let mut reader = csv::Reader::from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV header row")?
        .iter()
        .map(str::to_string)
        .collect();

    let Some(entity_idx) = headers.iter().position(|h| h == ENTITY_COLUMN) else {
        bail!("upstream CSV is missing the '{ENTITY_COLUMN}' column");
    };
    let Some(year_idx) = headers.iter().position(|h| h == YEAR_COLUMN) else {
        bail!("upstream CSV is missing the '{YEAR_COLUMN}' column");
    };

    // (column index, antigen name) for every coverage column.
    let coverage_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            h.strip_prefix(COVERAGE_PREFIX)
                .map(|antigen| (i, antigen.to_string()))
        })
        .collect();

    let mut raw_rows = Vec::new();
    let mut records = Vec::new();

    for (line, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("reading CSV record {line}"))?;

        let cells: Vec<Option<String>> = row
            .iter()
            .map(|c| (!c.is_empty()).then(|| c.to_string()))
            .collect();

        let country = cells[entity_idx].clone();
        let year: Option<i64> = cells[year_idx]
            .as_deref()
            .map(|cell| {
                cell.parse().with_context(|| {
                    format!("record {line} has a non-integer '{YEAR_COLUMN}' cell")
                })
            })
            .transpose()?;

        // A row with an empty Entity or Year cell stays in the raw table but
        // contributes no normalized records.
        if let (Some(country), Some(year)) = (country, year) {
            if (YEAR_MIN..=YEAR_MAX).contains(&year) {
                for (idx, antigen) in &coverage_cols {
                    if let Some(cell) = cells[*idx].as_deref() {
                        let coverage_pct: f64 = cell.parse().with_context(|| {
                            format!("record {line} has a non-numeric value in '{}'", headers[*idx])
                        })?;
                        records.push(CoverageRecord {
                            country: country.clone(),
                            antigen: antigen.clone(),
                            year,
                            coverage_pct,
                        });
                    }
                }
            }
        }

        raw_rows.push(cells);
    }

    debug!(
        raw_rows = raw_rows.len(),
        coverage_columns = coverage_cols.len(),
        records = records.len(),
        "CSV reshaped"
    );

    Ok((
        RawTable {
            headers,
            rows: raw_rows,
        },
        records,
    ))
}
