//! Configuration section types

use serde::Deserialize;

use crate::features::{BandCenter, BandPolicy};
use crate::strategy::{ClassifierConfig, ClassifierMode, GateConfig, StatusTolerance};

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Instrument symbols to monitor (e.g. BTCUSDT)
    pub instruments: Vec<String>,
    /// Polling interval in seconds
    pub poll_interval_secs: u64,
    /// Heartbeat banner interval in hours (0 disables)
    pub heartbeat_hours: u64,
    /// Send a banner on startup
    pub startup_banner: bool,
    /// Send informational status pings
    pub status_pings: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// REST base URL
    pub base_url: String,
    /// User-Agent header
    pub user_agent: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Closed candles requested per timeframe
    pub kline_limit: usize,
    /// Short timeframe (e.g. 1h)
    pub short_timeframe: String,
    /// Long timeframe (e.g. 4h)
    pub long_timeframe: String,
    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorsConfig {
    /// RSI period
    pub rsi_period: usize,
    /// EMA period for the trend corroborator
    pub ema_period: usize,
    /// Candles summed by the flow corroborator
    pub flow_lookback: usize,
    /// Oscillator values retained per series
    pub history_capacity: usize,
    pub trend_enabled: bool,
    pub trend_weight: f64,
    pub flow_enabled: bool,
    pub flow_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandsConfig {
    /// "mean" or "median"
    pub center: String,
    pub window: usize,
    pub min_samples: usize,
    pub dispersion_factor: f64,
    pub upper_min: f64,
    pub upper_max: f64,
    pub lower_min: f64,
    pub lower_max: f64,
}

impl BandsConfig {
    pub fn center(&self) -> Option<BandCenter> {
        match self.center.trim().to_lowercase().as_str() {
            "mean" => Some(BandCenter::Mean),
            "median" => Some(BandCenter::Median),
            _ => None,
        }
    }

    pub fn to_policy(&self) -> BandPolicy {
        let defaults = BandPolicy::default();
        BandPolicy {
            center: self.center().unwrap_or(defaults.center),
            window: self.window,
            min_samples: self.min_samples,
            upper_min: self.upper_min,
            upper_max: self.upper_max,
            lower_min: self.lower_min,
            lower_max: self.lower_max,
            warmup: defaults.warmup,
            fallback: defaults.fallback,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSection {
    /// "voting" or "threshold"
    pub mode: String,
    pub min_votes: f64,
    pub band_weight: f64,
    pub bias_weight: f64,
    pub long_weight: f64,
}

impl ClassifierSection {
    pub fn mode(&self) -> Option<ClassifierMode> {
        match self.mode.trim().to_lowercase().as_str() {
            "voting" => Some(ClassifierMode::Voting),
            "threshold" => Some(ClassifierMode::Threshold),
            _ => None,
        }
    }

    pub fn to_classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            mode: self.mode().unwrap_or(ClassifierMode::Voting),
            min_votes: self.min_votes,
            band_weight: self.band_weight,
            bias_weight: self.bias_weight,
            long_weight: self.long_weight,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateSection {
    /// Consecutive cycles required to confirm a new regime
    pub confirm_cycles: u32,
    /// Quiet period after a signal, in minutes
    pub cooldown_mins: u64,
    /// Minimum time between signals, in minutes
    pub min_gap_mins: u64,
    /// Minimum price move since the last signal, in percent
    pub min_move_pct: f64,
}

impl GateSection {
    pub fn to_gate(&self) -> GateConfig {
        GateConfig {
            confirm_cycles: self.confirm_cycles,
            cooldown_ms: self.cooldown_mins as i64 * 60_000,
            min_gap_ms: self.min_gap_mins as i64 * 60_000,
            min_move_pct: self.min_move_pct,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    pub price_tolerance_pct: f64,
    pub rsi_tolerance: f64,
    /// Minimum seconds between status pings per instrument
    pub min_interval_secs: u64,
}

impl StatusConfig {
    pub fn to_tolerance(&self) -> StatusTolerance {
        StatusTolerance {
            price_pct: self.price_tolerance_pct,
            rsi_points: self.rsi_tolerance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Telegram bot token (falls back to BOT_TOKEN)
    pub telegram_token: String,
    /// Telegram chat id (falls back to CHAT_ID)
    pub telegram_chat_id: String,
    pub telegram_api_url: String,
    pub request_timeout_ms: u64,
    /// At most one outbound message per this many seconds
    pub min_interval_secs: u64,
    /// Buffered messages folded into the next send
    pub buffer_size: usize,
    /// Identical error warnings are swallowed for this long
    pub error_cooldown_secs: u64,
}

impl NotifierConfig {
    /// Token and chat id, from config or the plain BOT_TOKEN / CHAT_ID vars
    pub fn telegram_credentials(&self) -> Option<(String, String)> {
        let pick = |configured: &str, var: &str| {
            let value = if configured.trim().is_empty() {
                std::env::var(var).unwrap_or_default()
            } else {
                configured.to_string()
            };
            let value = value.trim().to_string();
            (!value.is_empty()).then_some(value)
        };

        let token = pick(&self.telegram_token, "BOT_TOKEN")?;
        let chat_id = pick(&self.telegram_chat_id, "CHAT_ID")?;
        Some((token, chat_id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Gate state snapshot file name inside `data_dir`
    pub state_file: String,
    /// Disable to run fully in memory
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub enabled: bool,
    /// Listen address for the liveness endpoint
    pub bind_addr: String,
}
