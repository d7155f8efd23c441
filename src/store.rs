//! SQLite persistence.
//!
//! Both tables are replaced wholesale on every refresh. Each replace runs as
//! one transaction (drop, create, bulk insert) so a failed run never leaves a
//! half-written snapshot behind; the caller retries the whole ETL.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::config::{COVERAGE_PREFIX, Config};
use crate::transform::{CoverageRecord, RawTable};

/// Bookkeeping for the most recent refresh, kept in a single-row `etl_meta`
/// table and overwritten on every run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshMeta {
    pub refreshed_at: DateTime<Utc>,
    pub source: String,
    pub raw_rows: usize,
    pub coverage_rows: usize,
}

pub struct Store {
    conn: Connection,
    raw_table: String,
    clean_table: String,
}

impl Store {
    /// Opens (creating if absent) the database file named by the config.
    pub fn open(config: &Config) -> Result<Self> {
        let conn = Connection::open(&config.db_path)
            .with_context(|| format!("opening database {}", config.db_path.display()))?;
        debug!(db = %config.db_path.display(), "Database opened");
        Ok(Self::with_connection(conn, config))
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory(config: &Config) -> Result<Self> {
        Ok(Self::with_connection(Connection::open_in_memory()?, config))
    }

    fn with_connection(conn: Connection, config: &Config) -> Self {
        Self {
            conn,
            raw_table: config.raw_table.clone(),
            clean_table: config.clean_table.clone(),
        }
    }

    /// Replaces the raw wide table with the upstream snapshot, verbatim.
    ///
    /// Column names come straight from the CSV header. Affinity follows what
    /// the values hold: INTEGER for `Year`, REAL for coverage columns, TEXT
    /// otherwise. Empty cells land as NULL.
    pub fn replace_raw(&mut self, raw: &RawTable) -> Result<usize> {
        let columns: Vec<String> = raw
            .headers
            .iter()
            .map(|h| format!("{} {}", quote_ident(h), affinity(h)))
            .collect();
        let placeholders: Vec<String> =
            (1..=raw.headers.len()).map(|i| format!("?{i}")).collect();

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};\n CREATE TABLE {table} ({});",
            columns.join(", "),
            table = quote_ident(&self.raw_table),
        ))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote_ident(&self.raw_table),
                placeholders.join(", "),
            ))?;
            for row in &raw.rows {
                insert.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit().context("committing raw table snapshot")?;

        info!(table = %self.raw_table, rows = raw.rows.len(), "Raw table replaced");
        Ok(raw.rows.len())
    }

    /// Replaces the normalized table with the given records.
    ///
    /// The table carries PRIMARY KEY (country, antigen, year); a full replace
    /// means no upsert conflicts can arise.
    pub fn replace_coverage(&mut self, records: &[CoverageRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};\n\
             CREATE TABLE {table} (\n\
                 country TEXT,\n\
                 antigen TEXT,\n\
                 year INTEGER,\n\
                 coverage_pct REAL,\n\
                 PRIMARY KEY (country, antigen, year)\n\
             );",
            table = quote_ident(&self.clean_table),
        ))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (country, antigen, year, coverage_pct) VALUES (?1, ?2, ?3, ?4)",
                quote_ident(&self.clean_table),
            ))?;
            for r in records {
                insert.execute(params![r.country, r.antigen, r.year, r.coverage_pct])?;
            }
        }
        tx.commit().context("committing coverage snapshot")?;

        info!(table = %self.clean_table, rows = records.len(), "Coverage table replaced");
        Ok(records.len())
    }

    /// The (year, coverage_pct) series for one pair, ordered by year
    /// ascending. Empty means "no data", not an error.
    pub fn query_coverage(&self, country: &str, antigen: &str) -> Result<Vec<(i64, f64)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT year, coverage_pct FROM {} WHERE country = ?1 AND antigen = ?2 ORDER BY year",
            quote_ident(&self.clean_table),
        ))?;
        let rows = stmt
            .query_map(params![country, antigen], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every (country, antigen) pair present in the normalized table.
    pub fn distinct_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT country, antigen FROM {} ORDER BY country, antigen",
            quote_ident(&self.clean_table),
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Overwrites the refresh bookkeeping row.
    pub fn record_refresh(&self, meta: &RefreshMeta) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS etl_meta (
                 id INTEGER PRIMARY KEY CHECK (id = 1),
                 refreshed_at TEXT NOT NULL,
                 source TEXT NOT NULL,
                 raw_rows INTEGER NOT NULL,
                 coverage_rows INTEGER NOT NULL
             );",
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO etl_meta (id, refreshed_at, source, raw_rows, coverage_rows)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                meta.refreshed_at.to_rfc3339(),
                meta.source,
                meta.raw_rows as i64,
                meta.coverage_rows as i64,
            ],
        )?;
        Ok(())
    }

    /// Bookkeeping for the most recent refresh, if any run has completed.
    pub fn last_refresh(&self) -> Result<Option<RefreshMeta>> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'etl_meta')",
            [],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT refreshed_at, source, raw_rows, coverage_rows FROM etl_meta WHERE id = 1",
        )?;
        let mut rows = stmt.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let refreshed_at: String = row.get(0)?;
        let refreshed_at = DateTime::parse_from_rfc3339(&refreshed_at)
            .context("etl_meta holds a malformed refreshed_at timestamp")?
            .with_timezone(&Utc);
        let raw_rows: i64 = row.get(2)?;
        let coverage_rows: i64 = row.get(3)?;

        Ok(Some(RefreshMeta {
            refreshed_at,
            source: row.get(1)?,
            raw_rows: raw_rows as usize,
            coverage_rows: coverage_rows as usize,
        }))
    }
}

/// SQLite identifier quoting; upstream column names are not under our control.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn affinity(column: &str) -> &'static str {
    if column == "Year" {
        "INTEGER"
    } else if column.starts_with(COVERAGE_PREFIX) {
        "REAL"
    } else {
        "TEXT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform;

    const SAMPLE: &str = "\
Entity,Code,Year,coverage__mcv1,coverage__dtp3
Angola,AGO,2019,51,57
Angola,AGO,2020,,55
France,FRA,2019,90.5,96
";

    fn store_with_sample() -> Store {
        let mut store = Store::open_in_memory(&Config::default()).unwrap();
        let (raw, records) = transform(SAMPLE.as_bytes()).unwrap();
        store.replace_raw(&raw).unwrap();
        store.replace_coverage(&records).unwrap();
        store
    }

    #[test]
    fn test_query_round_trip_ordered_by_year() {
        let store = store_with_sample();
        let series = store.query_coverage("Angola", "dtp3").unwrap();
        assert_eq!(series, vec![(2019, 57.0), (2020, 55.0)]);
    }

    #[test]
    fn test_absent_pair_is_empty_not_error() {
        let store = store_with_sample();
        let series = store.query_coverage("Atlantis", "mcv1").unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_replace_is_idempotent() {
        let mut store = Store::open_in_memory(&Config::default()).unwrap();
        let (raw, records) = transform(SAMPLE.as_bytes()).unwrap();

        store.replace_raw(&raw).unwrap();
        store.replace_coverage(&records).unwrap();
        let first = store.query_coverage("France", "mcv1").unwrap();

        store.replace_raw(&raw).unwrap();
        store.replace_coverage(&records).unwrap();
        let second = store.query_coverage("France", "mcv1").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, vec![(2019, 90.5)]);
    }

    #[test]
    fn test_replace_discards_previous_snapshot() {
        let mut store = store_with_sample();
        store
            .replace_coverage(&[CoverageRecord {
                country: "Chad".into(),
                antigen: "bcg".into(),
                year: 2001,
                coverage_pct: 40.0,
            }])
            .unwrap();

        assert!(store.query_coverage("Angola", "dtp3").unwrap().is_empty());
        assert_eq!(store.query_coverage("Chad", "bcg").unwrap(), vec![(2001, 40.0)]);
    }

    #[test]
    fn test_distinct_pairs_sorted() {
        let store = store_with_sample();
        let pairs = store.distinct_pairs().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Angola".to_string(), "dtp3".to_string()),
                ("Angola".to_string(), "mcv1".to_string()),
                ("France".to_string(), "dtp3".to_string()),
                ("France".to_string(), "mcv1".to_string()),
            ]
        );
    }

    #[test]
    fn test_refresh_meta_round_trip() {
        let store = store_with_sample();
        assert!(store.last_refresh().unwrap().is_none());

        let meta = RefreshMeta {
            refreshed_at: Utc::now(),
            source: "fixture".into(),
            raw_rows: 3,
            coverage_rows: 5,
        };
        store.record_refresh(&meta).unwrap();

        let read = store.last_refresh().unwrap().unwrap();
        assert_eq!(read.source, "fixture");
        assert_eq!(read.raw_rows, 3);
        assert_eq!(read.coverage_rows, 5);
        assert_eq!(read.refreshed_at.timestamp(), meta.refreshed_at.timestamp());
    }
}
