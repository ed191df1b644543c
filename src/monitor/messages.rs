//! Alert texts

use chrono::{TimeZone, Utc};

use crate::strategy::GateConfig;
use crate::types::{Instrument, Regime, Timeframe};

/// `2024-05-01 12:00:00 UTC`
pub fn pretty_ts(ts_ms: i64) -> String {
    match Utc.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{} ms", ts_ms),
    }
}

/// Two decimals with thousands separators
pub fn format_price(price: f64) -> String {
    let fixed = format!("{:.2}", price.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct SignalView<'a> {
    pub instrument: &'a Instrument,
    pub short_tf: Timeframe,
    pub long_tf: Timeframe,
    pub short_rsi: f64,
    pub long_rsi: f64,
    pub price: f64,
    pub regime: Regime,
    pub previous: Regime,
    pub now: i64,
}

pub fn signal_message(view: &SignalView<'_>, gate: &GateConfig) -> String {
    format!(
        "⏱ {}\n{} | RSI{} {:.1} | RSI{} {:.1}\nPrice: {}\nDecision: {} (was {})\nAnti-scalping: persistence {} cycles + cooldown {}m.",
        pretty_ts(view.now),
        view.instrument,
        view.short_tf.interval().to_uppercase(),
        round1(view.short_rsi),
        view.long_tf.interval().to_uppercase(),
        round1(view.long_rsi),
        format_price(view.price),
        view.regime,
        view.previous,
        gate.confirm_cycles,
        gate.cooldown_ms / 60_000,
    )
}

pub fn status_message(
    instrument: &Instrument,
    price: f64,
    short: (Timeframe, f64),
    long: (Timeframe, f64),
    trend_up: bool,
    candidate: Regime,
) -> String {
    format!(
        "ℹ️ {} | {} | RSI{} {:.1} | RSI{} {:.1} | trend {} | raw {}",
        instrument,
        format_price(price),
        short.0.interval().to_uppercase(),
        round1(short.1),
        long.0.interval().to_uppercase(),
        round1(long.1),
        if trend_up { "up" } else { "down" },
        candidate,
    )
}

pub fn banner_message(heartbeat_hours: u64) -> String {
    if heartbeat_hours > 0 {
        format!(
            "🐺 RegimeWatch started: swing mode, no scalping. Alerts on confirmed signals only + heartbeat every {}h.",
            heartbeat_hours
        )
    } else {
        "🐺 RegimeWatch started: swing mode, no scalping. Alerts on confirmed signals only.".to_string()
    }
}

pub fn heartbeat_message(instruments: &[Instrument], cycles: u64) -> String {
    let names: Vec<&str> = instruments.iter().map(|i| i.symbol()).collect();
    format!(
        "💓 RegimeWatch alive: {} cycles, watching {}",
        cycles,
        names.join(", ")
    )
}

pub fn error_message(instrument: &Instrument, summary: &str, swallowed: u32) -> String {
    if swallowed > 0 {
        format!(
            "⚠️ Cycle error {}: {} (+{} repeats suppressed)",
            instrument, summary, swallowed
        )
    } else {
        format!("⚠️ Cycle error {}: {}", instrument, summary)
    }
}
