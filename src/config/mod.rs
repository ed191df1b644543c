//! Configuration management for RegimeWatch
//!
//! Defaults, then optional `config/default` and `config/local` files, then
//! environment variables (`REGIMEWATCH__SECTION__KEY`) loaded via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::types::{Instrument, Timeframe};

/// Upper bound for gate durations (one week)
const MAX_GATE_MINS: u64 = 7 * 24 * 60;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub market_data: MarketDataConfig,
    pub indicators: IndicatorsConfig,
    pub bands: BandsConfig,
    pub classifier: ClassifierSection,
    pub gate: GateSection,
    pub status: StatusConfig,
    pub notifier: NotifierConfig,
    pub persistence: PersistenceConfig,
    pub dashboard: DashboardConfig,
}

fn defaults_builder() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("bot.instruments", vec!["BTCUSDT", "ETHUSDT"])?
        .set_default("bot.poll_interval_secs", 60)?
        .set_default("bot.heartbeat_hours", 2)?
        .set_default("bot.startup_banner", true)?
        .set_default("bot.status_pings", false)?
        // Market data
        .set_default("market_data.base_url", "https://api.binance.com")?
        .set_default(
            "market_data.user_agent",
            concat!("regimewatch/", env!("CARGO_PKG_VERSION")),
        )?
        .set_default("market_data.request_timeout_ms", 10_000)?
        .set_default("market_data.kline_limit", 200)?
        .set_default("market_data.short_timeframe", "1h")?
        .set_default("market_data.long_timeframe", "4h")?
        .set_default("market_data.max_attempts", 3)?
        .set_default("market_data.retry_base_delay_ms", 500)?
        .set_default("market_data.retry_max_delay_ms", 5_000)?
        // Indicators
        .set_default("indicators.rsi_period", 14)?
        .set_default("indicators.ema_period", 50)?
        .set_default("indicators.flow_lookback", 5)?
        .set_default("indicators.history_capacity", 200)?
        .set_default("indicators.trend_enabled", true)?
        .set_default("indicators.trend_weight", 1.0)?
        .set_default("indicators.flow_enabled", true)?
        .set_default("indicators.flow_weight", 1.0)?
        // Adaptive bands
        .set_default("bands.center", "mean")?
        .set_default("bands.window", 100)?
        .set_default("bands.min_samples", 20)?
        .set_default("bands.dispersion_factor", 1.0)?
        .set_default("bands.upper_min", 55.0)?
        .set_default("bands.upper_max", 90.0)?
        .set_default("bands.lower_min", 10.0)?
        .set_default("bands.lower_max", 45.0)?
        // Classifier
        .set_default("classifier.mode", "voting")?
        .set_default("classifier.min_votes", 3.0)?
        .set_default("classifier.band_weight", 1.0)?
        .set_default("classifier.bias_weight", 1.0)?
        .set_default("classifier.long_weight", 1.0)?
        // Anti-scalping gate
        .set_default("gate.confirm_cycles", 3)?
        .set_default("gate.cooldown_mins", 30)?
        .set_default("gate.min_gap_mins", 45)?
        .set_default("gate.min_move_pct", 0.3)?
        // Status pings
        .set_default("status.price_tolerance_pct", 1.0)?
        .set_default("status.rsi_tolerance", 5.0)?
        .set_default("status.min_interval_secs", 900)?
        // Notifier
        .set_default("notifier.telegram_token", "")?
        .set_default("notifier.telegram_chat_id", "")?
        .set_default("notifier.telegram_api_url", "https://api.telegram.org")?
        .set_default("notifier.request_timeout_ms", 10_000)?
        .set_default("notifier.min_interval_secs", 60)?
        .set_default("notifier.buffer_size", 4)?
        .set_default("notifier.error_cooldown_secs", 900)?
        // Persistence
        .set_default("persistence.data_dir", "./data")?
        .set_default("persistence.state_file", "gate_state.json")?
        .set_default("persistence.enabled", true)?
        // Liveness endpoint
        .set_default("dashboard.enabled", true)?
        .set_default("dashboard.bind_addr", "0.0.0.0:8080")?;
    Ok(builder)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = defaults_builder()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (REGIMEWATCH__*)
            .add_source(
                Environment::with_prefix("REGIMEWATCH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bot.instruments")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Hosting platforms hand out the listen port via PORT
        if let Ok(port) = std::env::var("PORT") {
            let port = port.trim();
            if !port.is_empty() {
                app_config.dashboard.bind_addr = format!("0.0.0.0:{}", port);
            }
        }

        Ok(app_config)
    }

    /// Built-in defaults only, ignoring files and environment
    pub fn defaults() -> Result<Self> {
        defaults_builder()?
            .build()
            .context("Failed to build default configuration")?
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    /// Monitored instruments, normalized and deduplicated in order
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut out: Vec<Instrument> = Vec::new();
        for symbol in &self.bot.instruments {
            if symbol.trim().is_empty() {
                continue;
            }
            let instrument = Instrument::new(symbol.as_str());
            if !out.contains(&instrument) {
                out.push(instrument);
            }
        }
        out
    }

    pub fn short_timeframe(&self) -> Result<Timeframe> {
        parse_timeframe(&self.market_data.short_timeframe)
    }

    pub fn long_timeframe(&self) -> Result<Timeframe> {
        parse_timeframe(&self.market_data.long_timeframe)
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.instruments().is_empty() {
            bail!("bot.instruments must name at least one instrument");
        }
        if self.bot.poll_interval_secs == 0 {
            bail!("bot.poll_interval_secs must be positive");
        }

        let short = self.short_timeframe()?;
        let long = self.long_timeframe()?;
        if short.duration_secs() >= long.duration_secs() {
            bail!(
                "short timeframe {} must be shorter than long timeframe {}",
                short,
                long
            );
        }

        let period = self.indicators.rsi_period;
        if period < 2 {
            bail!("indicators.rsi_period must be at least 2");
        }
        if self.market_data.kline_limit <= period {
            bail!(
                "market_data.kline_limit ({}) must exceed indicators.rsi_period ({})",
                self.market_data.kline_limit,
                period
            );
        }

        if self.bands.center().is_none() {
            bail!("bands.center must be \"mean\" or \"median\", got {:?}", self.bands.center);
        }
        if self.bands.lower_min > self.bands.lower_max || self.bands.upper_min > self.bands.upper_max {
            bail!("bands clamp ranges are inverted");
        }
        if self.bands.dispersion_factor <= 0.0 {
            bail!("bands.dispersion_factor must be positive");
        }

        if self.classifier.mode().is_none() {
            bail!(
                "classifier.mode must be \"voting\" or \"threshold\", got {:?}",
                self.classifier.mode
            );
        }
        if self.gate.confirm_cycles == 0 {
            bail!("gate.confirm_cycles must be at least 1");
        }
        if self.gate.min_move_pct < 0.0 {
            bail!("gate.min_move_pct must not be negative");
        }
        if self.gate.cooldown_mins > MAX_GATE_MINS || self.gate.min_gap_mins > MAX_GATE_MINS {
            bail!(
                "gate.cooldown_mins and gate.min_gap_mins must not exceed {} (one week)",
                MAX_GATE_MINS
            );
        }

        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "instruments={:?} tf={}/{} poll={}s rsi={} bands={} mode={} confirm={} cooldown={}m gap={}m move={:.2}%",
            self.bot.instruments,
            self.market_data.short_timeframe,
            self.market_data.long_timeframe,
            self.bot.poll_interval_secs,
            self.indicators.rsi_period,
            self.bands.center,
            self.classifier.mode,
            self.gate.confirm_cycles,
            self.gate.cooldown_mins,
            self.gate.min_gap_mins,
            self.gate.min_move_pct
        )
    }
}

fn parse_timeframe(raw: &str) -> Result<Timeframe> {
    Timeframe::from_str(raw).with_context(|| format!("Unsupported timeframe {:?}", raw))
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
