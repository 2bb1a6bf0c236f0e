use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

use crate::utils::TimeSeries;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("not enough rows for the requested fit: needed {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("design matrix is singular")]
    Singular,
    #[error("confidence level must lie in (0.5, 1), got {0}")]
    InvalidLevel(f64),
}

/// Polynomial order and intercept choice for a least-squares fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolySpec {
    pub order: usize,
    pub fit_intercept: bool,
}

impl PolySpec {
    pub fn new(order: usize, fit_intercept: bool) -> Self {
        Self {
            order,
            fit_intercept,
        }
    }

    pub fn num_coefficients(&self) -> usize {
        self.order + usize::from(self.fit_intercept)
    }
}

/// Vandermonde-style design matrix. Column j holds x^j when the intercept
/// is fitted, x^(j+1) otherwise.
pub fn design_matrix(x: &[f64], spec: PolySpec) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), spec.num_coefficients(), |i, j| {
        let power = if spec.fit_intercept { j } else { j + 1 };
        x[i].powi(power as i32)
    })
}

/// Least-squares polynomial fit solved through the SVD of the design matrix.
#[derive(Clone, Debug)]
pub struct PolyFit {
    pub spec: PolySpec,
    /// Coefficients in ascending power order.
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
    pub residual_sum_squares: f64,
    pub n: usize,
}

impl PolyFit {
    pub fn fit(x: &[f64], y: &[f64], spec: PolySpec) -> Result<Self, FitError> {
        let n = x.len().min(y.len());
        let k = spec.num_coefficients();
        if n < k || k == 0 {
            return Err(FitError::InsufficientData {
                needed: k.max(1),
                got: n,
            });
        }
        let a = design_matrix(&x[..n], spec);
        let b = DVector::from_column_slice(&y[..n]);
        let svd = a.svd(true, true);
        let solution = svd.solve(&b, 1e-12).map_err(|_| FitError::Singular)?;
        let fit = Self {
            spec,
            coefficients: solution.iter().copied().collect(),
            r_squared: 0.0,
            residual_sum_squares: 0.0,
            n,
        };

        let mean_y = y[..n].iter().sum::<f64>() / n as f64;
        let mut sse = 0.0;
        let mut sst = 0.0;
        for i in 0..n {
            let resid = y[i] - fit.predict(x[i]);
            sse += resid * resid;
            let dev = y[i] - mean_y;
            sst += dev * dev;
        }
        let r_squared = if sst > 0.0 {
            1.0 - sse / sst
        } else if sse <= f64::EPSILON {
            1.0
        } else {
            0.0
        };
        Ok(Self {
            r_squared,
            residual_sum_squares: sse,
            ..fit
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(j, c)| {
                let power = if self.spec.fit_intercept { j } else { j + 1 };
                c * x.powi(power as i32)
            })
            .sum()
    }

    pub fn predict_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|x| self.predict(*x)).collect()
    }

    /// Equation text such as `y = 2.20 + 0.60x, R2=0.85`. With `r2_only`
    /// only the goodness-of-fit part is returned.
    pub fn summary_label(&self, decimals: usize, r2_only: bool) -> String {
        if r2_only {
            return format!("R2={:.2}", self.r_squared);
        }
        let mut eq = String::from("y = ");
        for (j, c) in self.coefficients.iter().enumerate() {
            let power = if self.spec.fit_intercept { j } else { j + 1 };
            let magnitude = format!("{:.prec$}", c.abs(), prec = decimals);
            let term = match power {
                0 => magnitude,
                1 => format!("{magnitude}x"),
                p => format!("{magnitude}x^{p}"),
            };
            if j == 0 {
                if *c < 0.0 {
                    eq.push('-');
                }
                eq.push_str(&term);
            } else if *c < 0.0 {
                eq.push_str(" - ");
                eq.push_str(&term);
            } else {
                eq.push_str(" + ");
                eq.push_str(&term);
            }
        }
        format!("{eq}, R2={:.2}", self.r_squared)
    }
}

/// Pointwise half-widths of the confidence band around fitted values.
///
/// Degrees of freedom are fixed at n - 2, the simple-linear-regression
/// convention; higher orders reuse it as an approximation. The level is a
/// one-sided t quantile and must lie in (0.5, 1) so the width stays positive.
pub fn confidence_half_widths(
    x: &[f64],
    y: &[f64],
    y_hat: &[f64],
    level: f64,
) -> Result<Vec<f64>, FitError> {
    if !(level > 0.5 && level < 1.0) {
        return Err(FitError::InvalidLevel(level));
    }
    let n = x.len().min(y.len()).min(y_hat.len());
    if n < 3 {
        return Err(FitError::InsufficientData { needed: 3, got: n });
    }
    let dof = (n - 2) as f64;
    let t = StudentsT::new(0.0, 1.0, dof)
        .expect("dof checked")
        .inverse_cdf(level);

    let mut resid_ss = 0.0;
    for i in 0..n {
        let resid = y[i] - y_hat[i];
        resid_ss += resid * resid;
    }
    let s_err = (resid_ss / dof).sqrt();

    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mut sxx = 0.0;
    for xi in &x[..n] {
        let dev = xi - mean_x;
        sxx += dev * dev;
    }
    if sxx <= 0.0 {
        return Err(FitError::Singular);
    }

    Ok(x[..n]
        .iter()
        .map(|xi| {
            let dev = xi - mean_x;
            t * s_err * (1.0 / n as f64 + dev * dev / sxx).sqrt()
        })
        .collect())
}

/// Linear-interpolation percentile of pre-sorted values, `p` in [0, 1].
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let weight = rank - low as f64;
        sorted[low] * (1.0 - weight) + sorted[high] * weight
    }
}

/// Equal-frequency cut points over the finite values, `num_buckets + 1` edges.
pub fn quantile_cut_points(values: &[f64], num_buckets: usize) -> Result<Vec<f64>, FitError> {
    let mut clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if num_buckets == 0 || clean.len() < 2 {
        return Err(FitError::InsufficientData {
            needed: num_buckets.max(1) + 1,
            got: clean.len(),
        });
    }
    clean.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok((0..=num_buckets)
        .map(|i| percentile(&clean, i as f64 / num_buckets as f64))
        .collect())
}

/// Bucket index per value. The first bucket keeps its left edge, the rest
/// are half-open `(lo, hi]`. Values outside the edges map to `None`.
pub fn assign_buckets(values: &[f64], edges: &[f64]) -> Vec<Option<usize>> {
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() || edges.len() < 2 {
                return None;
            }
            if v < edges[0] || v > edges[edges.len() - 1] {
                return None;
            }
            if v <= edges[1] {
                return Some(0);
            }
            for i in 1..edges.len() - 1 {
                if v > edges[i] && v <= edges[i + 1] {
                    return Some(i);
                }
            }
            None
        })
        .collect()
}

/// Interval text per bucket, `[lo, hi]` for the first and `(lo, hi]` after.
pub fn bucket_labels(edges: &[f64], decimals: usize) -> Vec<String> {
    let mut labels = Vec::new();
    for i in 0..edges.len().saturating_sub(1) {
        let open = if i == 0 { '[' } else { '(' };
        labels.push(format!(
            "{}{:.prec$}, {:.prec$}]",
            open,
            edges[i],
            edges[i + 1],
            prec = decimals
        ));
    }
    labels
}

#[derive(Clone, Debug)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub skewness: f64,
    pub hit_rate: f64,
}

pub fn performance_metrics(
    returns: &TimeSeries,
    rf: f64,
    periods_per_year: u32,
) -> PerformanceMetrics {
    let n = returns.len() as f64;
    let total_return = compounded_return(&returns.values);
    let annualized_return = if n > 0.0 {
        (1.0 + total_return).powf(periods_per_year as f64 / n) - 1.0
    } else {
        0.0
    };

    // Annualized volatility is shown as-is; Sharpe is recomputed from
    // per-period excess returns.
    let volatility = annualized_volatility(&returns.values, periods_per_year);
    let sharpe_ratio = sharpe_from_values(&returns.values, rf, periods_per_year);

    // Build equity curve for the drawdown stats
    let mut equity = Vec::with_capacity(returns.len());
    let mut eq = 1.0_f64;
    for r in &returns.values {
        if r.is_finite() {
            eq *= 1.0 + *r;
        }
        equity.push(eq);
    }
    let max_drawdown = drawdown_values(&equity)
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::min);

    PerformanceMetrics {
        total_return,
        annualized_return,
        annualized_volatility: volatility,
        sharpe_ratio,
        max_drawdown,
        skewness: skewness(&returns.values),
        hit_rate: hit_rate(&returns.values),
    }
}

fn compounded_return(returns: &[f64]) -> f64 {
    returns
        .iter()
        .filter(|v| v.is_finite())
        .fold(1.0, |acc, r| acc * (1.0 + r))
        - 1.0
}

fn annualized_volatility(returns: &[f64], periods_per_year: u32) -> f64 {
    let clean: Vec<f64> = returns.iter().copied().filter(|v| v.is_finite()).collect();
    if clean.len() < 2 {
        return 0.0;
    }
    let n = clean.len() as f64;
    let mean = clean.iter().sum::<f64>() / n;
    let var = clean
        .iter()
        .map(|r| {
            let diff = r - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    var.sqrt() * (periods_per_year as f64).sqrt()
}

fn sharpe_from_values(returns: &[f64], rf: f64, periods_per_year: u32) -> f64 {
    let vals: Vec<f64> = returns.iter().copied().filter(|v| v.is_finite()).collect();
    if vals.len() < 2 {
        return 0.0;
    }
    let n = vals.len() as f64;

    // Convert annual risk-free rate to per-period
    let rf_per_period = if rf != 0.0 {
        (1.0 + rf).powf(1.0 / periods_per_year as f64) - 1.0
    } else {
        0.0
    };

    let excess: Vec<f64> = vals.into_iter().map(|r| r - rf_per_period).collect();
    let mean = excess.iter().sum::<f64>() / n;
    let var = excess
        .iter()
        .map(|r| {
            let diff = *r - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    let std = var.sqrt();

    if std == 0.0 {
        0.0
    } else {
        mean / std * (periods_per_year as f64).sqrt()
    }
}

fn skewness(returns: &[f64]) -> f64 {
    let clean: Vec<f64> = returns.iter().copied().filter(|v| v.is_finite()).collect();
    if clean.len() < 3 {
        return 0.0;
    }
    let n = clean.len() as f64;
    let mean = clean.iter().sum::<f64>() / n;
    let var = clean
        .iter()
        .map(|r| {
            let diff = r - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    let m3 = clean.iter().map(|r| ((r - mean) / std).powi(3)).sum::<f64>();
    n / ((n - 1.0) * (n - 2.0)) * m3
}

fn hit_rate(returns: &[f64]) -> f64 {
    let clean: Vec<f64> = returns.iter().copied().filter(|v| v.is_finite()).collect();
    if clean.is_empty() {
        return 0.0;
    }
    clean.iter().filter(|r| **r > 0.0).count() as f64 / clean.len() as f64
}

#[derive(Clone, Debug)]
pub struct Drawdown {
    pub start: NaiveDate,
    pub trough: NaiveDate,
    pub end: NaiveDate,
    /// Depth as a negative fraction (e.g. -0.25 for -25%)
    pub depth: f64,
    /// Number of observations from peak break to recovery
    pub duration: u32,
}

/// Drawdown of a price or nav series relative to its running peak.
pub fn drawdown_series(nav: &TimeSeries) -> TimeSeries {
    TimeSeries {
        dates: nav.dates.clone(),
        values: drawdown_values(&nav.values),
        name: nav.name.clone(),
    }
}

/// Consecutive observations spent below the running peak, reset at each
/// fresh high.
pub fn time_under_water(nav: &TimeSeries) -> TimeSeries {
    let dd = drawdown_values(&nav.values);
    let mut count = 0.0;
    let values = dd
        .iter()
        .map(|d| {
            if d.is_finite() {
                if *d < 0.0 {
                    count += 1.0;
                } else {
                    count = 0.0;
                }
            }
            count
        })
        .collect();
    TimeSeries {
        dates: nav.dates.clone(),
        values,
        name: nav.name.clone(),
    }
}

fn drawdown_values(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NAN;
    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                return f64::NAN;
            }
            if !peak.is_finite() || *v > peak {
                peak = *v;
            }
            v / peak - 1.0
        })
        .collect()
}

/// The `top_n` deepest peak-to-recovery segments of a nav series.
pub fn top_drawdowns(nav: &TimeSeries, top_n: usize) -> Vec<Drawdown> {
    let mut segments = drawdown_segments(nav);
    segments.sort_by(|a, b| {
        a.depth
            .partial_cmp(&b.depth)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    segments.truncate(top_n);
    segments
}

fn drawdown_segments(nav: &TimeSeries) -> Vec<Drawdown> {
    let drawdowns = drawdown_values(&nav.values);
    let n = drawdowns.len();

    // Identify drawdown segments
    let mut segments: Vec<Drawdown> = Vec::new();
    let mut in_dd = false;
    let mut start_idx = 0usize;
    let mut trough_idx = 0usize;
    let mut min_dd = 0.0_f64;

    for i in 0..n {
        let dd = drawdowns[i];
        if !dd.is_finite() {
            continue;
        }
        if !in_dd {
            if dd < 0.0 {
                in_dd = true;
                start_idx = i;
                trough_idx = i;
                min_dd = dd;
            }
        } else {
            if dd < min_dd {
                min_dd = dd;
                trough_idx = i;
            }
            if dd >= 0.0 {
                // Recovered
                segments.push(Drawdown {
                    start: nav.dates[start_idx],
                    trough: nav.dates[trough_idx],
                    end: nav.dates[i],
                    depth: min_dd,
                    duration: (i - start_idx + 1) as u32,
                });
                in_dd = false;
            }
        }
    }

    // Handle open drawdown at the end
    if in_dd {
        let last = n - 1;
        segments.push(Drawdown {
            start: nav.dates[start_idx],
            trough: nav.dates[trough_idx],
            end: nav.dates[last],
            depth: min_dd,
            duration: (last - start_idx + 1) as u32,
        });
    }

    segments
}

/// Trailing-window sum; the first `window - 1` slots are NaN and non-finite
/// entries count as zero.
pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            values[i + 1 - window..=i]
                .iter()
                .filter(|v| v.is_finite())
                .sum()
        })
        .collect()
}

/// Trailing-window regression beta of `strategy` on `benchmark`.
pub fn rolling_beta(strategy: &[f64], benchmark: &[f64], window: usize) -> Vec<f64> {
    let n = strategy.len().min(benchmark.len());
    let window = window.max(2);
    (0..n)
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let pairs: Vec<(f64, f64)> = (i + 1 - window..=i)
                .map(|j| (strategy[j], benchmark[j]))
                .filter(|(s, b)| s.is_finite() && b.is_finite())
                .collect();
            if pairs.len() < 2 {
                return f64::NAN;
            }
            let m = pairs.len() as f64;
            let mean_s = pairs.iter().map(|p| p.0).sum::<f64>() / m;
            let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / m;
            let mut cov = 0.0;
            let mut var = 0.0;
            for (s, b) in &pairs {
                cov += (s - mean_s) * (b - mean_b);
                var += (b - mean_b) * (b - mean_b);
            }
            if var == 0.0 {
                f64::NAN
            } else {
                cov / var
            }
        })
        .collect()
}

/// Trailing-window annualized volatility of per-period returns.
pub fn rolling_volatility(values: &[f64], window: usize, periods_per_year: u32) -> Vec<f64> {
    let window = window.max(2);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().filter(|v| v.is_finite()).count() < 2 {
                return f64::NAN;
            }
            annualized_volatility(slice, periods_per_year)
        })
        .collect()
}

/// Trailing-window historical value-at-risk, reported as a positive loss
/// magnitude at the given confidence.
pub fn rolling_var(values: &[f64], window: usize, confidence: f64) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let mut slice: Vec<f64> = values[i + 1 - window..=i]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            if slice.is_empty() {
                return f64::NAN;
            }
            slice.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let q = percentile(&slice, 1.0 - confidence);
            -q.min(0.0)
        })
        .collect()
}

/// Compounded return per calendar key, keys in ascending order.
pub fn grouped_compounded<K: Ord + Clone>(
    dates: &[NaiveDate],
    values: &[f64],
    key_fn: impl Fn(NaiveDate) -> K,
) -> BTreeMap<K, f64> {
    let mut grouped: BTreeMap<K, f64> = BTreeMap::new();
    for (date, value) in dates.iter().zip(values) {
        if !value.is_finite() {
            continue;
        }
        let entry = grouped.entry(key_fn(*date)).or_insert(1.0);
        *entry *= 1.0 + value;
    }
    grouped.into_iter().map(|(k, v)| (k, v - 1.0)).collect()
}

pub fn monthly_compounded(returns: &TimeSeries) -> BTreeMap<(i32, u32), f64> {
    grouped_compounded(&returns.dates, &returns.values, |d| (d.year(), d.month()))
}

pub fn yearly_compounded(returns: &TimeSeries) -> BTreeMap<i32, f64> {
    grouped_compounded(&returns.dates, &returns.values, |d| d.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn linear_fit_recovers_slope_and_intercept() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = PolyFit::fit(&x, &y, PolySpec::new(1, true)).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 2.2, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.coefficients[1], 0.6, epsilon = 1e-9);
    }

    #[test]
    fn quadratic_fit_is_exact_on_quadratic_data() {
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * v + 3.0 * v * v).collect();
        let fit = PolyFit::fit(&x, &y, PolySpec::new(2, true)).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.coefficients[1], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.coefficients[2], 3.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn no_intercept_fit_passes_through_origin() {
        let x = [1.0, 2.0, 3.0];
        let y = [2.0, 4.0, 6.0];
        let fit = PolyFit::fit(&x, &y, PolySpec::new(1, false)).unwrap();
        assert_eq!(fit.coefficients.len(), 1);
        assert_abs_diff_eq!(fit.coefficients[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.predict(4.0), 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.predict(0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn fit_requires_enough_rows() {
        let result = PolyFit::fit(&[1.0, 2.0], &[1.0, 2.0], PolySpec::new(2, true));
        assert!(matches!(
            result,
            Err(FitError::InsufficientData { needed: 3, got: 2 })
        ));
    }

    #[test]
    fn summary_label_joins_terms_with_signs() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, -1.0, -3.0];
        let fit = PolyFit::fit(&x, &y, PolySpec::new(1, true)).unwrap();
        assert_eq!(fit.summary_label(2, false), "y = 1.00 - 2.00x, R2=1.00");
        assert_eq!(fit.summary_label(2, true), "R2=1.00");
    }

    #[test]
    fn summary_label_marks_higher_powers() {
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v * v).collect();
        let fit = PolyFit::fit(&x, &y, PolySpec::new(2, true)).unwrap();
        let label = fit.summary_label(2, false);
        assert!(label.contains("x^2"), "label was {label}");
        assert!(label.ends_with("R2=1.00"), "label was {label}");
    }

    #[test]
    fn summary_label_starts_at_the_linear_term_without_intercept() {
        let x = [1.0, 2.0, 3.0];
        let y = [2.0, 4.0, 6.0];
        let fit = PolyFit::fit(&x, &y, PolySpec::new(1, false)).unwrap();
        assert_eq!(fit.summary_label(2, false), "y = 2.00x, R2=1.00");
    }

    #[test]
    fn band_is_positive_and_narrowest_at_the_mean() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = PolyFit::fit(&x, &y, PolySpec::new(1, true)).unwrap();
        let y_hat = fit.predict_many(&x);
        let half = confidence_half_widths(&x, &y, &y_hat, 0.95).unwrap();
        assert_eq!(half.len(), x.len());
        for h in &half {
            assert!(*h > 0.0);
        }
        // x = 3 is the mean, so the band is tightest there
        assert!(half[2] < half[0]);
        assert!(half[2] < half[4]);
        assert_abs_diff_eq!(half[0], half[4], epsilon = 1e-12);
    }

    #[test]
    fn band_collapses_on_exact_fit() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        let fit = PolyFit::fit(&x, &y, PolySpec::new(1, true)).unwrap();
        let y_hat = fit.predict_many(&x);
        let half = confidence_half_widths(&x, &y, &y_hat, 0.95).unwrap();
        for h in half {
            assert_abs_diff_eq!(h, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn band_rejects_bad_inputs() {
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0];
        assert!(matches!(
            confidence_half_widths(&x, &y, &y, 1.5),
            Err(FitError::InvalidLevel(_))
        ));
        // at or below the median the t quantile is not positive
        assert!(matches!(
            confidence_half_widths(&x, &y, &y, 0.5),
            Err(FitError::InvalidLevel(_))
        ));
        assert!(matches!(
            confidence_half_widths(&x, &y, &y, 0.4),
            Err(FitError::InvalidLevel(_))
        ));
        assert!(matches!(
            confidence_half_widths(&x[..2], &y[..2], &y[..2], 0.95),
            Err(FitError::InsufficientData { needed: 3, got: 2 })
        ));
    }

    #[test]
    fn quantile_buckets_are_balanced() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let edges = quantile_cut_points(&values, 4).unwrap();
        assert_eq!(edges.len(), 5);
        let assignments = assign_buckets(&values, &edges);
        let mut counts = [0usize; 4];
        for a in assignments {
            counts[a.unwrap()] += 1;
        }
        for count in counts {
            assert!((24..=26).contains(&count), "counts were {counts:?}");
        }
    }

    #[test]
    fn values_outside_edges_are_unassigned() {
        let edges = [-1.0, 0.0, 1.0];
        let assignments = assign_buckets(&[-2.0, -1.0, -0.5, 0.5, 2.0, f64::NAN], &edges);
        assert_eq!(
            assignments,
            vec![None, Some(0), Some(0), Some(1), None, None]
        );
    }

    #[test]
    fn bucket_labels_close_only_the_first_left_edge() {
        let labels = bucket_labels(&[-3.0, -1.5, 0.0], 2);
        assert_eq!(labels, vec!["[-3.00, -1.50]", "(-1.50, 0.00]"]);
    }

    #[test]
    fn drawdowns_on_monotone_nav_are_empty() {
        let nav = TimeSeries::new(
            vec![date(2021, 1, 1), date(2021, 1, 2), date(2021, 1, 3)],
            vec![100.0, 101.0, 102.0],
            "nav",
        )
        .unwrap();
        assert!(top_drawdowns(&nav, 5).is_empty());
        for v in drawdown_series(&nav).values {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn drawdown_segment_tracks_trough_and_recovery() {
        let nav = TimeSeries::new(
            vec![
                date(2021, 1, 1),
                date(2021, 1, 4),
                date(2021, 1, 5),
                date(2021, 1, 6),
            ],
            vec![100.0, 110.0, 99.0, 121.0],
            "nav",
        )
        .unwrap();
        let top = top_drawdowns(&nav, 3);
        assert_eq!(top.len(), 1);
        assert_abs_diff_eq!(top[0].depth, -0.1, epsilon = 1e-12);
        assert_eq!(top[0].start, date(2021, 1, 5));
        assert_eq!(top[0].trough, date(2021, 1, 5));
        assert_eq!(top[0].end, date(2021, 1, 6));
        assert_eq!(top[0].duration, 2);
    }

    #[test]
    fn time_under_water_resets_at_new_highs() {
        let nav = TimeSeries::new(
            vec![
                date(2021, 1, 1),
                date(2021, 1, 2),
                date(2021, 1, 3),
                date(2021, 1, 4),
                date(2021, 1, 5),
            ],
            vec![100.0, 90.0, 95.0, 101.0, 100.0],
            "nav",
        )
        .unwrap();
        let tuw = time_under_water(&nav);
        assert_eq!(tuw.values, vec![0.0, 1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn rolling_sum_waits_for_a_full_window() {
        let out = rolling_sum(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[3.0, 5.0, 7.0]);
    }

    #[test]
    fn rolling_beta_of_a_series_on_itself_is_one() {
        let values: Vec<f64> = (0..20).map(|i| ((i * 7 % 13) as f64 - 6.0) / 100.0).collect();
        let betas = rolling_beta(&values, &values, 10);
        assert!(betas[8].is_nan());
        for beta in &betas[9..] {
            assert_abs_diff_eq!(*beta, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn rolling_volatility_annualizes_the_window_std() {
        let out = rolling_volatility(&[0.01, -0.01, 0.01, -0.01], 4, 252);
        assert!(out[2].is_nan());
        // sample std of the alternating window, scaled by sqrt(252)
        let expected = (4.0_f64 / 30000.0).sqrt() * 252.0_f64.sqrt();
        assert_abs_diff_eq!(out[3], expected, epsilon = 1e-12);
    }

    #[test]
    fn rolling_var_reports_loss_magnitude() {
        let out = rolling_var(&[-0.1, 0.0, 0.1], 3, 0.9);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_abs_diff_eq!(out[2], 0.08, epsilon = 1e-12);
    }

    #[test]
    fn monthly_returns_compound_within_the_month() {
        let returns = TimeSeries::new(
            vec![date(2021, 1, 5), date(2021, 1, 6), date(2021, 2, 3)],
            vec![0.1, 0.1, 0.05],
            "r",
        )
        .unwrap();
        let monthly = monthly_compounded(&returns);
        assert_abs_diff_eq!(monthly[&(2021, 1)], 0.21, epsilon = 1e-12);
        assert_abs_diff_eq!(monthly[&(2021, 2)], 0.05, epsilon = 1e-12);
        let yearly = yearly_compounded(&returns);
        assert_abs_diff_eq!(yearly[&2021], 1.1 * 1.1 * 1.05 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn metrics_compound_and_count_hits() {
        let returns = TimeSeries::new(
            vec![date(2021, 1, 1), date(2021, 1, 2)],
            vec![0.1, -0.05],
            "r",
        )
        .unwrap();
        let metrics = performance_metrics(&returns, 0.0, 252);
        assert_abs_diff_eq!(metrics.total_return, 0.045, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.hit_rate, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.max_drawdown, -0.05, epsilon = 1e-12);
    }
}
