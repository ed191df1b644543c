//! Closed-candle hygiene for REST kline windows
//!
//! Kline endpoints return the in-progress candle as the last row. It must be
//! dropped before the series reaches the oscillator, otherwise the latest
//! RSI value would keep changing until the period closes.

use crate::types::Candle;

/// Drop candles whose period has not fully elapsed at `now_ms`
pub fn retain_closed(candles: &mut Vec<Candle>, now_ms: i64) -> usize {
    let before = candles.len();
    candles.retain(|c| c.is_closed_at(now_ms));
    before - candles.len()
}

/// Sort ascending by open time and drop duplicate periods (last row wins)
pub fn validate_series(candles: &mut Vec<Candle>) {
    candles.sort_by_key(|c| c.open_time);
    let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles.drain(..) {
        match deduped.last_mut() {
            Some(last) if last.open_time == candle.open_time => *last = candle,
            _ => deduped.push(candle),
        }
    }
    *candles = deduped;
}
