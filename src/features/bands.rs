//! Adaptive decision bands derived from the oscillator's own distribution
//!
//! Replaces fixed overbought/oversold constants. The band centre follows the
//! recent oscillator regime and the width follows its dispersion, clamped so
//! the decision zones can never fully open or fully close.

use serde::{Deserialize, Serialize};

/// Lower/upper decision thresholds. Invariant: `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub lower: f64,
    pub upper: f64,
}

impl Bands {
    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

/// Central tendency / dispersion pair used for the bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandCenter {
    /// Mean ± population standard deviation
    Mean,
    /// Median ± IQR / 1.349 (standard-deviation equivalent)
    Median,
}

/// Tunable band policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandPolicy {
    pub center: BandCenter,
    /// Trailing values considered
    pub window: usize,
    /// Below this many finite values the warm-up band is returned
    pub min_samples: usize,
    pub upper_min: f64,
    pub upper_max: f64,
    pub lower_min: f64,
    pub lower_max: f64,
    /// Returned until enough history exists
    pub warmup: Bands,
    /// Returned when clamping would invert the band
    pub fallback: Bands,
}

impl Default for BandPolicy {
    fn default() -> Self {
        Self {
            center: BandCenter::Mean,
            window: 100,
            min_samples: 20,
            upper_min: 55.0,
            upper_max: 90.0,
            lower_min: 10.0,
            lower_max: 45.0,
            warmup: Bands {
                lower: 30.0,
                upper: 70.0,
            },
            fallback: Bands {
                lower: 45.0,
                upper: 55.0,
            },
        }
    }
}

/// Compute bands from the trailing oscillator history.
///
/// Never fails: short histories yield the warm-up band, degenerate results
/// the neutral fallback.
pub fn compute_bands(history: &[f64], dispersion_factor: f64, policy: &BandPolicy) -> Bands {
    let mut recent: Vec<f64> = history
        .iter()
        .rev()
        .filter(|v| v.is_finite())
        .take(policy.window)
        .copied()
        .collect();

    if recent.len() < policy.min_samples.max(1) {
        return policy.warmup;
    }

    let (center, dispersion) = match policy.center {
        BandCenter::Mean => mean_std(&recent),
        BandCenter::Median => {
            recent.sort_by(|a, b| a.total_cmp(b));
            median_iqr_sigma(&recent)
        }
    };

    let upper = clamp_ordered(
        center + dispersion_factor * dispersion,
        policy.upper_min,
        policy.upper_max,
    );
    let lower = clamp_ordered(
        center - dispersion_factor * dispersion,
        policy.lower_min,
        policy.lower_max,
    );

    if !upper.is_finite() || !lower.is_finite() || lower >= upper {
        tracing::debug!(
            center,
            dispersion,
            lower,
            upper,
            "Bands: degenerate after clamping, using fallback"
        );
        return policy.fallback;
    }

    Bands { lower, upper }
}

/// Clamp that tolerates inverted bounds instead of panicking like `f64::clamp`
fn clamp_ordered(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Expects `sorted` ascending and non-empty
fn median_iqr_sigma(sorted: &[f64]) -> (f64, f64) {
    let q1 = quantile(sorted, 0.25);
    let median = quantile(sorted, 0.5);
    let q3 = quantile(sorted, 0.75);
    (median, (q3 - q1) / 1.349)
}

/// Linear-interpolated quantile
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ordered(b: Bands) {
        assert!(b.lower < b.upper, "lower {} >= upper {}", b.lower, b.upper);
    }

    #[test]
    fn test_empty_history_returns_warmup() {
        let policy = BandPolicy::default();
        let bands = compute_bands(&[], 1.0, &policy);
        assert_eq!(bands, policy.warmup);
        assert_ordered(bands);
    }

    #[test]
    fn test_short_history_returns_warmup() {
        let policy = BandPolicy::default();
        let history = vec![60.0; 5];
        assert_eq!(compute_bands(&history, 1.0, &policy), policy.warmup);
    }

    #[test]
    fn test_constant_history_stays_ordered() {
        let policy = BandPolicy::default();
        for level in [0.0, 10.0, 50.0, 100.0] {
            let history = vec![level; 50];
            assert_ordered(compute_bands(&history, 1.0, &policy));
        }
    }

    #[test]
    fn test_mean_std_bands() {
        let policy = BandPolicy::default();
        // Alternating 40/60: mean 50, std 10
        let history: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 40.0 } else { 60.0 }).collect();
        let bands = compute_bands(&history, 1.0, &policy);
        assert!((bands.upper - 60.0).abs() < 1e-9);
        assert!((bands.lower - 40.0).abs() < 1e-9);
        assert!((bands.midpoint() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_wide_dispersion_is_clamped() {
        let policy = BandPolicy::default();
        let history: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 0.0 } else { 100.0 }).collect();
        let bands = compute_bands(&history, 2.0, &policy);
        assert_eq!(bands.upper, 90.0);
        assert_eq!(bands.lower, 10.0);
    }

    #[test]
    fn test_inverted_bounds_fall_back() {
        let policy = BandPolicy {
            upper_min: 30.0,
            upper_max: 35.0,
            lower_min: 40.0,
            lower_max: 60.0,
            ..BandPolicy::default()
        };
        let history = vec![50.0; 30];
        assert_eq!(compute_bands(&history, 1.0, &policy), policy.fallback);
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let policy = BandPolicy::default();
        let mut history = vec![f64::NAN; 10];
        history.extend(vec![50.0; 25]);
        history.push(f64::INFINITY);
        let bands = compute_bands(&history, 1.0, &policy);
        assert_ordered(bands);
        assert_eq!(bands.upper, 55.0);
        assert_eq!(bands.lower, 45.0);
    }

    #[test]
    fn test_window_uses_trailing_values() {
        let policy = BandPolicy {
            window: 20,
            ..BandPolicy::default()
        };
        let mut history = vec![20.0; 100];
        history.extend((0..20).map(|i| if i % 2 == 0 { 60.0 } else { 80.0 }));
        let bands = compute_bands(&history, 1.0, &policy);
        assert!((bands.upper - 80.0).abs() < 1e-9);
        assert_eq!(bands.lower, 45.0);
    }

    #[test]
    fn test_median_policy() {
        let policy = BandPolicy {
            center: BandCenter::Median,
            ..BandPolicy::default()
        };
        let history: Vec<f64> = (0..=40).map(|i| 30.0 + i as f64).collect();
        let bands = compute_bands(&history, 1.0, &policy);
        // Median 50, IQR 20
        let sigma = 20.0 / 1.349;
        assert!((bands.upper - (50.0 + sigma)).abs() < 1e-9);
        assert!((bands.lower - (50.0 - sigma)).abs() < 1e-9);
    }
}
