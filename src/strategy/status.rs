//! Status ping change detection
//!
//! Informational updates are looser than trade signals: any material change
//! in price, either oscillator or the trend flag qualifies, subject only to
//! a per-instrument minimum interval.

use serde::{Deserialize, Serialize};

/// What an informational status message reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub price: f64,
    pub short_rsi: f64,
    pub long_rsi: f64,
    pub trend_up: bool,
    /// Observation time in milliseconds
    pub ts: i64,
}

/// Change thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTolerance {
    /// Relative price move, in percent
    pub price_pct: f64,
    /// Absolute oscillator move, in RSI points
    pub rsi_points: f64,
}

impl Default for StatusTolerance {
    fn default() -> Self {
        Self {
            price_pct: 1.0,
            rsi_points: 5.0,
        }
    }
}

/// True when `current` differs enough from `last` to be worth reporting
pub fn materially_changed(
    current: &StatusSnapshot,
    last: Option<&StatusSnapshot>,
    tolerance: &StatusTolerance,
) -> bool {
    let last = match last {
        Some(last) => last,
        None => return true,
    };

    if current.trend_up != last.trend_up {
        return true;
    }

    let price_moved = if last.price > 0.0 {
        (current.price - last.price).abs() / last.price * 100.0 > tolerance.price_pct
    } else {
        current.price != last.price
    };

    price_moved
        || (current.short_rsi - last.short_rsi).abs() > tolerance.rsi_points
        || (current.long_rsi - last.long_rsi).abs() > tolerance.rsi_points
}

/// Minimum interval between status messages
#[derive(Debug, Clone, Copy)]
pub struct StatusThrottle {
    min_interval_ms: i64,
}

impl StatusThrottle {
    pub fn new(min_interval_secs: u64) -> Self {
        Self {
            min_interval_ms: min_interval_secs as i64 * 1000,
        }
    }

    pub fn allows(&self, last_sent: Option<i64>, now: i64) -> bool {
        match last_sent {
            Some(last) => now - last >= self.min_interval_ms,
            None => true,
        }
    }
}
