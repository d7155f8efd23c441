//! Before/after campaign comparison.
//!
//! Slices a (year, coverage) series into a pre-campaign and a post-campaign
//! window, then runs Welch's unequal-variance t-test and puts a 95% CI around
//! each window mean. Pure computation over data already loaded from the store.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Mean and CI for one window of the series.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSummary {
    /// Inclusive year bounds of the window.
    pub start_year: i64,
    pub end_year: i64,
    /// Observations actually present in the window.
    pub n: usize,
    pub mean: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    pub t_statistic: f64,
    pub p_value: f64,
    pub before: WindowSummary,
    pub after: WindowSummary,
    /// mean(after) - mean(before); positive means coverage rose.
    pub difference: f64,
}

impl ComparisonResult {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Outcome of one comparison. Too few observations is a valid outcome, not an
/// error; callers render a notice instead of statistics.
#[derive(Debug, Clone, Serialize)]
pub enum Comparison {
    Computed(ComparisonResult),
    InsufficientData { before_n: usize, after_n: usize },
}

/// Compares the windows around `campaign_year`.
///
/// Before window: [campaign_year - pre_years, campaign_year - 1].
/// After window: [campaign_year, campaign_year + post_years]. Both inclusive.
/// Either window holding fewer than 2 observations yields
/// [`Comparison::InsufficientData`].
pub fn compare(
    series: &[(i64, f64)],
    campaign_year: i64,
    pre_years: i64,
    post_years: i64,
) -> Comparison {
    let before_span = (campaign_year - pre_years, campaign_year - 1);
    let after_span = (campaign_year, campaign_year + post_years);

    let before_vals = window_values(series, before_span.0, before_span.1);
    let after_vals = window_values(series, after_span.0, after_span.1);

    if before_vals.len() < 2 || after_vals.len() < 2 {
        return Comparison::InsufficientData {
            before_n: before_vals.len(),
            after_n: after_vals.len(),
        };
    }

    let (t_statistic, p_value) = welch_t_test(&before_vals, &after_vals);
    let before = summarize(before_span, &before_vals);
    let after = summarize(after_span, &after_vals);
    let difference = after.mean - before.mean;

    Comparison::Computed(ComparisonResult {
        t_statistic,
        p_value,
        before,
        after,
        difference,
    })
}

fn window_values(series: &[(i64, f64)], start_year: i64, end_year: i64) -> Vec<f64> {
    series
        .iter()
        .filter(|(year, _)| (start_year..=end_year).contains(year))
        .map(|(_, value)| *value)
        .collect()
}

fn summarize((start_year, end_year): (i64, i64), values: &[f64]) -> WindowSummary {
    let (ci_lower, ci_upper) = mean_ci(values, 0.95);
    WindowSummary {
        start_year,
        end_year,
        n: values.len(),
        mean: mean(values),
        ci_lower,
        ci_upper,
    }
}

/// Welch's two-sample t-test; degrees of freedom by Welch-Satterthwaite.
/// The statistic is computed over (a, b) in that order, so a mean increase
/// from a to b gives a negative t.
fn welch_t_test(a: &[f64], b: &[f64]) -> (f64, f64) {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (sample_variance(a), sample_variance(b));

    let se_sq = va / na + vb / nb;
    if se_sq == 0.0 {
        // Both windows constant. Identical means are a perfect null fit;
        // different means separate with certainty.
        return if ma == mb {
            (0.0, 1.0)
        } else {
            ((ma - mb).signum() * f64::INFINITY, 0.0)
        };
    }

    let t = (ma - mb) / se_sq.sqrt();
    let df = se_sq.powi(2)
        / ((va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0));

    let p = StudentsT::new(0.0, 1.0, df)
        .map(|dist| 2.0 * dist.cdf(-t.abs()))
        .unwrap_or(f64::NAN);

    (t, p)
}

/// 95% (or other) confidence interval around the mean, using the t quantile
/// with n-1 degrees of freedom. Shared by both windows. Undefined (NaN
/// bounds) below 2 observations.
pub fn mean_ci(values: &[f64], confidence: f64) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }

    let m = mean(values);
    let se = (sample_variance(values) / n as f64).sqrt();
    let h = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map(|dist| se * dist.inverse_cdf((1.0 + confidence) / 2.0))
        .unwrap_or(f64::NAN);

    (m - h, m + h)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computed(c: Comparison) -> ComparisonResult {
        match c {
            Comparison::Computed(r) => r,
            Comparison::InsufficientData { before_n, after_n } => {
                panic!("expected a computed result, got InsufficientData ({before_n}/{after_n})")
            }
        }
    }

    #[test]
    fn test_strong_separation_scenario() {
        let series = vec![
            (2015, 60.0),
            (2016, 62.0),
            (2017, 65.0),
            (2018, 80.0),
            (2019, 85.0),
            (2020, 88.0),
        ];
        let result = computed(compare(&series, 2018, 2, 2));

        assert_eq!((result.before.start_year, result.before.end_year), (2016, 2017));
        assert_eq!((result.after.start_year, result.after.end_year), (2018, 2020));
        assert_eq!(result.before.n, 2);
        assert_eq!(result.after.n, 3);
        assert!((result.before.mean - 63.5).abs() < 1e-9);
        assert!((result.after.mean - 84.333333).abs() < 1e-4);
        assert!((result.difference - 20.833333).abs() < 1e-4);
        assert!(result.p_value < 0.05);
        assert!(result.is_significant(0.05));
        // Coverage rose, so t over (before, after) is negative.
        assert!(result.t_statistic < 0.0);
    }

    #[test]
    fn test_series_edge_yields_insufficient_data() {
        // Before window [1976, 1980] catches only the single 1980 point.
        let series = vec![(1980, 70.0), (1981, 72.0), (1982, 74.0), (1983, 73.0)];
        match compare(&series, 1981, 5, 5) {
            Comparison::InsufficientData { before_n, after_n } => {
                assert_eq!(before_n, 1);
                assert_eq!(after_n, 3);
            }
            Comparison::Computed(_) => panic!("expected InsufficientData"),
        }
    }

    #[test]
    fn test_insufficient_iff_either_window_below_two() {
        let series: Vec<(i64, f64)> =
            (2010..=2020).map(|y| (y, 50.0 + (y - 2010) as f64)).collect();

        // Both windows well populated.
        assert!(matches!(compare(&series, 2015, 3, 3), Comparison::Computed(_)));
        // After window entirely past the series.
        assert!(matches!(
            compare(&series, 2021, 3, 3),
            Comparison::InsufficientData { .. }
        ));
        // Exactly 2 observations per window is enough.
        assert!(matches!(compare(&series, 2012, 2, 1), Comparison::Computed(_)));
    }

    #[test]
    fn test_gaps_in_series_reduce_window_counts() {
        // 2016 missing: before window [2015, 2017] holds 2 points, not 3.
        let series = vec![(2015, 60.0), (2017, 64.0), (2018, 70.0), (2019, 72.0)];
        let result = computed(compare(&series, 2018, 3, 2));
        assert_eq!(result.before.n, 2);
    }

    #[test]
    fn test_mean_ci_undefined_below_two_values() {
        let (lo, hi) = mean_ci(&[50.0], 0.95);
        assert!(lo.is_nan() && hi.is_nan());
        let (lo, hi) = mean_ci(&[], 0.95);
        assert!(lo.is_nan() && hi.is_nan());
    }

    #[test]
    fn test_mean_ci_brackets_mean_symmetrically() {
        let values = [60.0, 62.0, 64.0, 66.0];
        let (lo, hi) = mean_ci(&values, 0.95);
        assert!(lo < 63.0 && 63.0 < hi);
        assert!((63.0 - lo - (hi - 63.0)).abs() < 1e-9);
        // scipy: t.ppf(0.975, 3) = 3.1824, sem = 1.2910, h = 4.1085
        assert!((lo - 58.8915).abs() < 1e-3);
        assert!((hi - 67.1085).abs() < 1e-3);
    }

    #[test]
    fn test_welch_matches_scipy_reference() {
        // scipy.stats.ttest_ind([62, 65], [80, 85, 88], equal_var=False)
        // -> statistic = -7.51052, pvalue = 0.0050194 (df = 2.97757)
        let result = computed(compare(
            &[(2016, 62.0), (2017, 65.0), (2018, 80.0), (2019, 85.0), (2020, 88.0)],
            2018,
            2,
            2,
        ));
        assert!((result.t_statistic - (-7.51052)).abs() < 1e-4);
        assert!((result.p_value - 0.0050194).abs() < 1e-4);
    }

    #[test]
    fn test_constant_windows_do_not_produce_nan() {
        let flat = vec![(2015, 90.0), (2016, 90.0), (2017, 90.0), (2018, 90.0)];
        let result = computed(compare(&flat, 2017, 2, 1));
        assert_eq!(result.t_statistic, 0.0);
        assert_eq!(result.p_value, 1.0);

        let step = vec![(2015, 80.0), (2016, 80.0), (2017, 90.0), (2018, 90.0)];
        let result = computed(compare(&step, 2017, 2, 1));
        assert!(result.t_statistic.is_infinite());
        assert_eq!(result.p_value, 0.0);
    }
}
