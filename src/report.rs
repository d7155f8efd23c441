//! Comparison output: CSV export, PNG time-series plot, result printing.
//!
//! Pure rendering over an already-queried series; nothing here touches the
//! database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use serde::Serialize;
use tracing::{debug, info};

use crate::compare::ComparisonResult;

const LIGHT_BLUE: RGBColor = RGBColor(173, 216, 230);
const LIGHT_GREEN: RGBColor = RGBColor(144, 238, 144);

#[derive(Serialize)]
struct SeriesRow {
    year: i64,
    coverage_pct: f64,
}

/// `coverage_<country>_<antigen>.csv` under `dir`, spaces replaced with
/// underscores.
pub fn series_csv_path(dir: &Path, country: &str, antigen: &str) -> PathBuf {
    dir.join(format!("coverage_{country}_{antigen}.csv").replace(' ', "_"))
}

/// `plot_<country>_<antigen>.png` under `dir`, spaces replaced with
/// underscores.
pub fn plot_path(dir: &Path, country: &str, antigen: &str) -> PathBuf {
    dir.join(format!("plot_{country}_{antigen}.png").replace(' ', "_"))
}

/// Writes the raw (year, coverage_pct) series with a header row.
pub fn write_series_csv(path: &Path, series: &[(i64, f64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for &(year, coverage_pct) in series {
        writer.serialize(SeriesRow { year, coverage_pct })?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = series.len(), "Series CSV written");
    Ok(())
}

/// Renders the coverage time series as a PNG.
///
/// Line-plus-marker trace of the full series, a dashed vertical marker at the
/// campaign year, shaded before/after window spans, y-axis fixed to 0..100.
pub fn render_plot(
    path: &Path,
    series: &[(i64, f64)],
    country: &str,
    antigen: &str,
    campaign_year: i64,
    pre_years: i64,
    post_years: i64,
) -> Result<()> {
    let campaign = i32::try_from(campaign_year)
        .context("campaign year is outside the plottable range")?;
    let before_start = campaign_year
        .checked_sub(pre_years)
        .and_then(|y| i32::try_from(y).ok())
        .context("before window start is outside the plottable range")?;
    let after_end = campaign_year
        .checked_add(post_years)
        .and_then(|y| i32::try_from(y).ok())
        .context("after window end is outside the plottable range")?;
    let years = series
        .iter()
        .map(|&(y, _)| i32::try_from(y))
        .collect::<Result<Vec<i32>, _>>()
        .context("series year is outside the plottable range")?;

    let x_min = years.iter().copied().min().unwrap_or(campaign).min(before_start) - 1;
    let x_max = years.iter().copied().max().unwrap_or(campaign).max(after_end) + 1;

    let root = BitMapBackend::new(path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{country} — {antigen} coverage over time"),
            ("sans-serif", 22),
        )
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, 0f64..100f64)?;

    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc("Coverage (%)")
        .draw()?;

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(before_start, 0.0), (campaign, 100.0)],
            LIGHT_BLUE.mix(0.3).filled(),
        )))?
        .label("Before")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], LIGHT_BLUE.filled()));

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(campaign, 0.0), (after_end, 100.0)],
            LIGHT_GREEN.mix(0.3).filled(),
        )))?
        .label("After")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], LIGHT_GREEN.filled()));

    chart
        .draw_series(DashedLineSeries::new(
            [(campaign, 0.0), (campaign, 100.0)],
            6,
            4,
            RED.stroke_width(2).into(),
        ))?
        .label(format!("Campaign {campaign_year}"))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], RED.stroke_width(2)));

    let points: Vec<(i32, f64)> = years
        .iter()
        .zip(series)
        .map(|(&x, &(_, v))| (x, v.clamp(0.0, 100.0)))
        .collect();
    chart
        .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))?
        .label("Coverage (%)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], BLUE.stroke_width(2)));
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 3, BLUE.filled())),
    )?;

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    debug!(path = %path.display(), "Plot written");
    Ok(())
}

/// Logs the comparison as pretty-printed JSON.
pub fn print_json(result: &ComparisonResult) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// Logs the comparison in the analysis summary format.
pub fn print_pretty(result: &ComparisonResult, country: &str, antigen: &str) {
    info!(country, antigen, "Before/after campaign analysis");
    info!(
        "   Period: {}-{} vs {}-{}",
        result.before.start_year, result.before.end_year, result.after.start_year, result.after.end_year
    );
    info!("   t-statistic = {:.3}", result.t_statistic);
    info!("   p-value     = {:.5}", result.p_value);
    info!(
        "   Avg Before = {:.1}% (95% CI: {:.1}-{:.1})",
        result.before.mean, result.before.ci_lower, result.before.ci_upper
    );
    info!(
        "   Avg After  = {:.1}% (95% CI: {:.1}-{:.1})",
        result.after.mean, result.after.ci_lower, result.after.ci_upper
    );
    info!("   Difference = {:+.1} percentage points", result.difference);
}
