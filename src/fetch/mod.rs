//! Upstream CSV download.
//!
//! A single GET against the OWID grapher export. Non-success status, timeout,
//! or transport failure aborts the run; no retry.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

/// Downloads the coverage CSV and returns the raw body bytes.
///
/// # Errors
///
/// Fails on a non-2xx status, on timeout, or on any transport error.
pub async fn fetch_csv<C: HttpClient>(client: &C, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let mut req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    *req.timeout_mut() = Some(timeout);

    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()
        .with_context(|| format!("GET {url} returned an error status"))?;

    let bytes = resp.bytes().await?.to_vec();
    debug!(url, bytes = bytes.len(), "Coverage CSV fetched");
    Ok(bytes)
}
