//! Core types used throughout RegimeWatch
//!
//! Defines instruments, timeframes, candles, price samples and regimes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque instrument symbol (e.g. "BTCUSDT").
///
/// The unit of independent state: every instrument owns its own gate state
/// and oscillator history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().trim().to_uppercase())
    }

    /// Symbol as sent to exchange APIs
    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Instrument::new(s)
    }
}

/// Supported candle timeframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    Min15,
    Hour1,
    Hour4,
    Day1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Hour1
    }
}

impl Timeframe {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Timeframe::Min15 => 15 * 60,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 4 * 60 * 60,
            Timeframe::Day1 => 24 * 60 * 60,
        }
    }

    /// Interval string used by the klines endpoint
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "15m" | "15min" => Some(Timeframe::Min15),
            "1h" | "1hour" => Some(Timeframe::Hour1),
            "4h" | "4hour" => Some(Timeframe::Hour4),
            "1d" | "1day" => Some(Timeframe::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interval())
    }
}

/// Directional verdict for an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Long,
    Short,
    Wait,
}

impl Default for Regime {
    fn default() -> Self {
        Regime::Wait
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Long => write!(f, "LONG"),
            Regime::Short => write!(f, "SHORT"),
            Regime::Wait => write!(f, "WAIT"),
        }
    }
}

/// Live price observation, distinct from completed candle closes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub instrument: Instrument,
    pub price: f64,
    /// Observation time in milliseconds
    pub ts: i64,
}

/// Completed candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time (start of period)
    pub open_time: i64,
    /// Close time (end of period)
    pub close_time: i64,
    /// Timeframe
    pub timeframe: Timeframe,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in base currency
    pub volume: f64,
    /// Number of trades
    pub trades: u64,
}

impl Candle {
    /// True once the candle period has fully elapsed at `now_ms`
    pub fn is_closed_at(&self, now_ms: i64) -> bool {
        self.close_time < now_ms
    }
}

/// Close prices of a candle series, in order
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
