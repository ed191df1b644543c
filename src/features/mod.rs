//! Feature Engine - Momentum oscillator and corroborating indicators
//!
//! Computes from closed candle series:
//! - RSI (Wilder's smoothing), batch and incremental
//! - EMA trend reference
//! - Volume flow slope
//!
//! The oscillator is seeded once with the simple mean of the first `period`
//! gains/losses and then only ever advanced by the newest delta, so values
//! already produced never change when later candles arrive.

pub mod bands;
pub use bands::{compute_bands, BandCenter, BandPolicy, Bands};

use std::collections::{HashMap, VecDeque};

use crate::error::IndicatorError;
use crate::types::{Candle, Instrument, Timeframe};

/// RSI value for a pair of smoothed averages.
///
/// Zero average loss saturates at 100, including a perfectly flat series.
pub fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Incremental Wilder RSI state
#[derive(Debug, Clone, PartialEq)]
pub struct RsiState {
    period: usize,
    last_close: Option<f64>,
    /// Deltas consumed so far (saturates once seeded)
    deltas: usize,
    /// Running sums during warm-up, smoothed averages afterwards
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiState {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod);
        }
        Ok(Self {
            period,
            last_close: None,
            deltas: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// True once `period` deltas have been consumed
    pub fn is_seeded(&self) -> bool {
        self.deltas >= self.period
    }

    /// Current value, if seeded
    pub fn value(&self) -> Option<f64> {
        self.is_seeded()
            .then(|| rsi_value(self.avg_gain, self.avg_loss))
    }

    /// Feed the next close. Returns the oscillator value once seeded.
    pub fn push(&mut self, close: f64) -> Option<f64> {
        let prev = match self.last_close.replace(close) {
            Some(prev) => prev,
            None => return None,
        };

        let delta = close - prev;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        let period = self.period as f64;

        if self.is_seeded() {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        } else {
            self.avg_gain += gain;
            self.avg_loss += loss;
            self.deltas += 1;
            if self.is_seeded() {
                self.avg_gain /= period;
                self.avg_loss /= period;
            }
        }

        self.value()
    }
}

/// Compute the RSI series for `closes`.
///
/// Output has the same length as the input; the first `period` entries are
/// `None` (warm-up).
pub fn compute_oscillator(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>, IndicatorError> {
    let mut state = RsiState::new(period)?;
    if closes.len() <= period {
        return Err(IndicatorError::InsufficientData {
            available: closes.len(),
            period,
        });
    }
    Ok(closes.iter().map(|&c| state.push(c)).collect())
}

/// EMA of closes, seeded with the first close
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = closes[0];
    for close in closes.iter().skip(1) {
        ema = (close - ema) * multiplier + ema;
    }
    Some(ema)
}

/// Signed volume over the last `lookback` candles.
///
/// Up candles add their volume, down candles subtract it.
pub fn flow_slope(candles: &[Candle], lookback: usize) -> Option<f64> {
    if lookback == 0 || candles.len() < lookback {
        return None;
    }

    let slope = candles
        .iter()
        .rev()
        .take(lookback)
        .map(|c| {
            if c.close > c.open {
                c.volume
            } else if c.close < c.open {
                -c.volume
            } else {
                0.0
            }
        })
        .sum();
    Some(slope)
}

/// Latest oscillator value plus the retained history (oldest first)
#[derive(Debug, Clone)]
pub struct OscillatorReading {
    pub value: f64,
    pub history: Vec<f64>,
    /// Number of candles consumed by this update
    pub consumed: usize,
}

#[derive(Debug, Clone)]
struct TrackedSeries {
    rsi: RsiState,
    last_open_time: i64,
    history: VecDeque<f64>,
}

impl TrackedSeries {
    fn record(&mut self, value: f64, capacity: usize) {
        self.history.push_back(value);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

/// Keeps one incremental RSI per (instrument, timeframe) across polling
/// cycles, feeding it only candles it has not seen yet.
pub struct OscillatorTracker {
    period: usize,
    /// Maximum oscillator values retained per series
    capacity: usize,
    series: HashMap<(Instrument, Timeframe), TrackedSeries>,
}

impl OscillatorTracker {
    pub fn new(period: usize, capacity: usize) -> Self {
        Self {
            period,
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Advance the series with a window of closed candles.
    ///
    /// Candles newer than the last one consumed are fed incrementally. When
    /// the window no longer overlaps (first call, or a gap after downtime)
    /// the series is reseeded from the window.
    pub fn update(
        &mut self,
        instrument: &Instrument,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<OscillatorReading, IndicatorError> {
        let key = (instrument.clone(), timeframe);

        if let Some(tracked) = self.series.get_mut(&key) {
            let overlaps = candles
                .iter()
                .any(|c| c.open_time == tracked.last_open_time);

            if overlaps {
                let since = tracked.last_open_time;
                let mut consumed = 0;
                for candle in candles.iter().filter(|c| c.open_time > since) {
                    if let Some(value) = tracked.rsi.push(candle.close) {
                        tracked.record(value, self.capacity);
                    }
                    tracked.last_open_time = candle.open_time;
                    consumed += 1;
                }

                if let Some(value) = tracked.rsi.value() {
                    tracing::debug!(
                        instrument = %instrument,
                        timeframe = %timeframe,
                        consumed,
                        rsi = value,
                        "RSI: advanced incrementally"
                    );
                    return Ok(OscillatorReading {
                        value,
                        history: tracked.history.iter().copied().collect(),
                        consumed,
                    });
                }
            }

            tracing::debug!(
                instrument = %instrument,
                timeframe = %timeframe,
                "RSI: window does not overlap tracked series, reseeding"
            );
        }

        let tracked = self.reseed(candles)?;
        let reading = OscillatorReading {
            value: tracked.rsi.value().unwrap_or(50.0),
            history: tracked.history.iter().copied().collect(),
            consumed: candles.len(),
        };
        self.series.insert(key, tracked);
        Ok(reading)
    }

    fn reseed(&self, candles: &[Candle]) -> Result<TrackedSeries, IndicatorError> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let values = compute_oscillator(&closes, self.period)?;

        let mut rsi = RsiState::new(self.period)?;
        for &close in &closes {
            rsi.push(close);
        }

        let mut tracked = TrackedSeries {
            rsi,
            last_open_time: candles.last().map(|c| c.open_time).unwrap_or_default(),
            history: VecDeque::with_capacity(self.capacity),
        };
        for value in values.into_iter().flatten() {
            tracked.record(value, self.capacity);
        }
        Ok(tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candle(i: i64, open: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 1_700_000_000_000 + i * 3_600_000,
            close_time: 1_700_000_000_000 + (i + 1) * 3_600_000 - 1,
            timeframe: Timeframe::Hour1,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume,
            trades: 0,
        }
    }

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_candle(i as i64, c, c, 1.0))
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_warmup_is_undefined() {
        let closes = wave(30);
        let series = compute_oscillator(&closes, 14).unwrap();
        assert_eq!(series.len(), closes.len());
        assert!(series[..14].iter().all(Option::is_none));
        assert!(series[14..].iter().all(Option::is_some));
    }

    #[test]
    fn test_insufficient_data() {
        let closes = wave(14);
        assert_eq!(
            compute_oscillator(&closes, 14),
            Err(IndicatorError::InsufficientData {
                available: 14,
                period: 14
            })
        );
        assert_eq!(compute_oscillator(&closes, 0), Err(IndicatorError::InvalidPeriod));
    }

    #[test]
    fn test_seed_is_simple_mean() {
        // Deltas: +1, -2, +3 => avg gain 4/3, avg loss 2/3
        let series = compute_oscillator(&[10.0, 11.0, 9.0, 12.0], 3).unwrap();
        let expected = 100.0 - 100.0 / (1.0 + 2.0);
        assert!((series[3].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_wilder_update() {
        // Seed as above, then delta -1: gain (4/3*2)/3, loss (2/3*2 + 1)/3
        let series = compute_oscillator(&[10.0, 11.0, 9.0, 12.0, 11.0], 3).unwrap();
        let avg_gain = (4.0 / 3.0 * 2.0) / 3.0;
        let avg_loss = (2.0 / 3.0 * 2.0 + 1.0) / 3.0;
        let expected = rsi_value(avg_gain, avg_loss);
        assert!((series[4].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rising_series_saturates_high() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let series = compute_oscillator(&closes, 14).unwrap();
        let last = series.last().copied().flatten().unwrap();
        assert!(last >= 95.0);
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_falling_series_goes_to_zero() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let series = compute_oscillator(&closes, 14).unwrap();
        let last = series.last().copied().flatten().unwrap();
        assert!(last.abs() < 1e-9);
    }

    #[test]
    fn test_flat_series_is_100() {
        let closes = vec![50.0; 20];
        let series = compute_oscillator(&closes, 14).unwrap();
        assert_eq!(series.last().copied().flatten(), Some(100.0));
    }

    #[test]
    fn test_incremental_matches_batch() {
        let closes = wave(60);
        let batch = compute_oscillator(&closes, 14).unwrap();

        let mut state = RsiState::new(14).unwrap();
        let incremental: Vec<Option<f64>> = closes.iter().map(|&c| state.push(c)).collect();
        assert_eq!(batch, incremental);
    }

    #[test]
    fn test_ema_and_flow() {
        let closes = vec![1.0, 2.0, 3.0, 4.0];
        let value = ema(&closes, 3).unwrap();
        assert!(value > 1.0 && value < 4.0);
        assert!(ema(&closes, 5).is_none());

        let candles = vec![
            make_candle(0, 10.0, 11.0, 5.0),
            make_candle(1, 11.0, 10.0, 2.0),
            make_candle(2, 10.0, 10.0, 7.0),
        ];
        assert_eq!(flow_slope(&candles, 3), Some(3.0));
        assert_eq!(flow_slope(&candles, 4), None);
    }

    #[test]
    fn test_tracker_does_not_rewrite_history() {
        let closes = wave(80);
        let candles = candles_from(&closes);
        let inst = Instrument::new("BTCUSDT");
        let mut tracker = OscillatorTracker::new(14, 200);

        // First window: candles 0..50
        let first = tracker
            .update(&inst, Timeframe::Hour1, &candles[0..50])
            .unwrap();
        assert_eq!(first.history.len(), 36);

        // Sliding window 10..60 overlaps: only 10 new candles consumed
        let second = tracker
            .update(&inst, Timeframe::Hour1, &candles[10..60])
            .unwrap();
        assert_eq!(second.consumed, 10);
        assert_eq!(&second.history[..first.history.len()], &first.history[..]);

        // Incremental result equals a full batch over 0..60
        let batch = compute_oscillator(&closes[0..60], 14).unwrap();
        assert!((second.value - batch[59].unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_tracker_same_window_consumes_nothing() {
        let candles = candles_from(&wave(50));
        let inst = Instrument::new("BTCUSDT");
        let mut tracker = OscillatorTracker::new(14, 200);

        let first = tracker.update(&inst, Timeframe::Hour1, &candles).unwrap();
        let again = tracker.update(&inst, Timeframe::Hour1, &candles).unwrap();
        assert_eq!(again.consumed, 0);
        assert_eq!(again.value, first.value);
        assert_eq!(again.history, first.history);

        // One more closed candle advances by exactly one value
        let longer = candles_from(&wave(51));
        let next = tracker.update(&inst, Timeframe::Hour1, &longer[1..]).unwrap();
        assert_eq!(next.consumed, 1);
        assert_eq!(next.history.len(), first.history.len() + 1);
    }

    #[test]
    fn test_tracker_reseeds_after_gap() {
        let closes = wave(120);
        let candles = candles_from(&closes);
        let inst = Instrument::new("ETHUSDT");
        let mut tracker = OscillatorTracker::new(14, 200);

        tracker.update(&inst, Timeframe::Hour1, &candles[0..30]).unwrap();
        let reading = tracker
            .update(&inst, Timeframe::Hour1, &candles[60..100])
            .unwrap();

        let batch = compute_oscillator(&closes[60..100], 14).unwrap();
        assert!((reading.value - batch[39].unwrap()).abs() < 1e-9);
        assert_eq!(reading.history.len(), 26);
    }

    #[test]
    fn test_tracker_history_is_bounded() {
        let candles = candles_from(&wave(100));
        let inst = Instrument::new("BTCUSDT");
        let mut tracker = OscillatorTracker::new(14, 20);
        let reading = tracker.update(&inst, Timeframe::Hour1, &candles).unwrap();
        assert_eq!(reading.history.len(), 20);
        assert_eq!(*reading.history.last().unwrap(), reading.value);
    }

    #[test]
    fn test_tracker_insufficient_data() {
        let candles = candles_from(&wave(10));
        let inst = Instrument::new("BTCUSDT");
        let mut tracker = OscillatorTracker::new(14, 20);
        assert!(matches!(
            tracker.update(&inst, Timeframe::Hour1, &candles),
            Err(IndicatorError::InsufficientData { .. })
        ));
    }
}
