//! NaN-aware rolling primitives.
//!
//! Every function returns a `Vec<f64>` the same length as its input, with
//! `f64::NAN` wherever the value is undefined. A value at index t reads only
//! inputs at indices <= t.

use serde::{Deserialize, Serialize};

/// A trailing window and the minimum number of defined observations it
/// needs before producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub len: usize,
    pub min_periods: usize,
}

impl Window {
    /// A window that must be completely filled.
    pub const fn full(len: usize) -> Self {
        Self {
            len,
            min_periods: len,
        }
    }

    pub const fn new(len: usize, min_periods: usize) -> Self {
        Self { len, min_periods }
    }
}

/// Defined values in the window ending at `t`, or `None` when there are
/// fewer than `min_periods` of them.
fn window_values(x: &[f64], t: usize, w: Window) -> Option<Vec<f64>> {
    if w.len == 0 {
        return None;
    }
    let start = (t + 1).saturating_sub(w.len);
    let vals: Vec<f64> = x[start..=t].iter().copied().filter(|v| !v.is_nan()).collect();
    (vals.len() >= w.min_periods.max(1)).then_some(vals)
}

fn rolling<F>(x: &[f64], w: Window, f: F) -> Vec<f64>
where
    F: Fn(&[f64], f64) -> f64,
{
    (0..x.len())
        .map(|t| match window_values(x, t, w) {
            Some(vals) => f(&vals, x[t]),
            None => f64::NAN,
        })
        .collect()
}

fn mean(vals: &[f64]) -> f64 {
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn sample_std(vals: &[f64]) -> f64 {
    if vals.len() < 2 {
        return f64::NAN;
    }
    let m = mean(vals);
    let var = vals.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (vals.len() - 1) as f64;
    var.sqrt()
}

fn median(vals: &[f64]) -> f64 {
    let mut sorted = vals.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// `x[t] / x[t-n] - 1`.
pub fn pct_change(x: &[f64], n: usize) -> Vec<f64> {
    (0..x.len())
        .map(|t| {
            if n == 0 || t < n {
                f64::NAN
            } else {
                x[t] / x[t - n] - 1.0
            }
        })
        .collect()
}

/// `x[t-n]`, NaN for the first `n` entries.
pub fn shift(x: &[f64], n: usize) -> Vec<f64> {
    (0..x.len())
        .map(|t| if t < n { f64::NAN } else { x[t - n] })
        .collect()
}

pub fn rolling_mean(x: &[f64], w: Window) -> Vec<f64> {
    rolling(x, w, |vals, _| mean(vals))
}

/// Sample standard deviation (ddof = 1).
pub fn rolling_std(x: &[f64], w: Window) -> Vec<f64> {
    rolling(x, w, |vals, _| sample_std(vals))
}

pub fn rolling_median(x: &[f64], w: Window) -> Vec<f64> {
    rolling(x, w, |vals, _| median(vals))
}

/// Percentile rank of the latest value within its trailing window, with
/// ties given their average rank. Undefined when the latest value is.
pub fn rolling_percentile_rank(x: &[f64], w: Window) -> Vec<f64> {
    rolling(x, w, |vals, last| {
        if last.is_nan() {
            return f64::NAN;
        }
        let below = vals.iter().filter(|v| **v < last).count() as f64;
        let equal = vals.iter().filter(|v| **v == last).count() as f64;
        (below + (equal + 1.0) / 2.0) / vals.len() as f64
    })
}

/// `(x - mean) / std` over the trailing window; undefined when the std is
/// zero up to rounding, or undefined.
pub fn zscore(x: &[f64], w: Window) -> Vec<f64> {
    rolling(x, w, |vals, last| {
        let m = mean(vals);
        let sd = sample_std(vals);
        if sd.is_nan() || sd <= 1e-12 * m.abs().max(1.0) || last.is_nan() {
            f64::NAN
        } else {
            (last - m) / sd
        }
    })
}

/// Highest value seen so far. NaN inputs stay NaN and do not reset the peak.
pub fn running_max(x: &[f64]) -> Vec<f64> {
    let mut peak = f64::NAN;
    x.iter()
        .map(|&v| {
            if v.is_nan() {
                return f64::NAN;
            }
            if peak.is_nan() || v > peak {
                peak = v;
            }
            peak
        })
        .collect()
}

/// `x / running_max(x) - 1`, always <= 0 where defined.
pub fn drawdown_from_peak(x: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(running_max(x))
        .map(|(&v, peak)| if peak > 0.0 { v / peak - 1.0 } else { f64::NAN })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{assert_approx, assert_nan_prefix, DEFAULT_EPSILON};

    #[test]
    fn pct_change_basic() {
        let r = pct_change(&[100.0, 110.0, 121.0, 96.8], 1);
        assert_nan_prefix(&r, 1);
        assert_approx(r[1], 0.10, DEFAULT_EPSILON);
        assert_approx(r[2], 0.10, DEFAULT_EPSILON);
        assert_approx(r[3], -0.20, DEFAULT_EPSILON);

        let r3 = pct_change(&[100.0, 105.0, 110.0, 120.0], 3);
        assert_nan_prefix(&r3, 3);
        assert_approx(r3[3], 0.20, DEFAULT_EPSILON);
    }

    #[test]
    fn pct_change_zero_lookback_is_undefined() {
        assert!(pct_change(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn shift_moves_values_forward() {
        let s = shift(&[1.0, 2.0, 3.0], 2);
        assert_nan_prefix(&s, 2);
        assert_eq!(s[2], 1.0);
    }

    #[test]
    fn rolling_mean_full_window() {
        let m = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], Window::full(3));
        assert_nan_prefix(&m, 2);
        assert_approx(m[2], 2.0, DEFAULT_EPSILON);
        assert_approx(m[4], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_min_periods() {
        let m = rolling_mean(&[2.0, 4.0, 6.0, 8.0], Window::new(10, 2));
        assert!(m[0].is_nan());
        assert_approx(m[1], 3.0, DEFAULT_EPSILON);
        assert_approx(m[3], 5.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_skips_nan_inputs() {
        let m = rolling_mean(&[f64::NAN, 2.0, 4.0], Window::new(3, 2));
        assert_approx(m[2], 3.0, DEFAULT_EPSILON);
        let full = rolling_mean(&[f64::NAN, 2.0, 4.0], Window::full(3));
        assert!(full[2].is_nan());
    }

    #[test]
    fn rolling_std_is_sample_std() {
        let s = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], Window::full(8));
        // Sample variance of this set is 32/7.
        assert_approx(s[7], (32.0_f64 / 7.0).sqrt(), 1e-12);
    }

    #[test]
    fn rolling_std_needs_two_points() {
        let s = rolling_std(&[1.0, 3.0], Window::new(3, 1));
        assert!(s[0].is_nan());
        assert_approx(s[1], 2.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn rolling_median_even_and_odd() {
        let m = rolling_median(&[5.0, 1.0, 3.0, 2.0], Window::new(4, 1));
        assert_approx(m[0], 5.0, DEFAULT_EPSILON);
        assert_approx(m[1], 3.0, DEFAULT_EPSILON);
        assert_approx(m[2], 3.0, DEFAULT_EPSILON);
        assert_approx(m[3], 2.5, DEFAULT_EPSILON);
    }

    #[test]
    fn percentile_rank_of_latest() {
        let r = rolling_percentile_rank(&[1.0, 2.0, 3.0, 4.0], Window::full(4));
        assert_approx(r[3], 1.0, DEFAULT_EPSILON);
        let low = rolling_percentile_rank(&[4.0, 3.0, 2.0, 1.0], Window::full(4));
        assert_approx(low[3], 0.25, DEFAULT_EPSILON);
    }

    #[test]
    fn percentile_rank_averages_ties() {
        // Ranks of 2,2 are 2 and 3 -> average 2.5 of 4.
        let r = rolling_percentile_rank(&[1.0, 2.0, 5.0, 2.0], Window::full(4));
        assert_approx(r[3], 2.5 / 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zscore_undefined_on_flat_window() {
        let z = zscore(&[1.0, 1.0, 1.0], Window::full(3));
        assert!(z[2].is_nan());
        // A flat window whose mean picks up rounding noise.
        let z = zscore(&[0.1 + 0.2; 7], Window::full(7));
        assert!(z[6].is_nan());
        let z = zscore(&[1.0, 2.0, 3.0], Window::full(3));
        assert_approx(z[2], 1.0, 1e-12);
    }

    #[test]
    fn running_max_and_drawdown() {
        let x = [100.0, 120.0, 90.0, 130.0];
        assert_eq!(running_max(&x), vec![100.0, 120.0, 120.0, 130.0]);
        let dd = drawdown_from_peak(&x);
        assert_approx(dd[2], -0.25, DEFAULT_EPSILON);
        assert_eq!(dd[3], 0.0);
        assert!(dd.iter().all(|v| *v <= 0.0));
    }

    #[test]
    fn running_max_ignores_nan() {
        let m = running_max(&[f64::NAN, 2.0, f64::NAN, 1.0]);
        assert!(m[0].is_nan());
        assert_eq!(m[1], 2.0);
        assert!(m[2].is_nan());
        assert_eq!(m[3], 2.0);
    }
}
