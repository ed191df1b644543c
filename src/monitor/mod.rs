//! Polling scheduler
//!
//! One sequential loop: every tick, each instrument is fetched, classified
//! and passed through its anti-scalping gate. A failing instrument is
//! skipped for the cycle without touching its gate state. State is saved
//! after every cycle.

mod board;
mod messages;

pub use board::{shared_board, InstrumentSummary, SharedBoard, StatusBoard};
pub use messages::{format_price, pretty_ts};

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, IndicatorsConfig};
use crate::error::EngineError;
use crate::features::{compute_bands, BandPolicy, OscillatorTracker};
use crate::notify::{ErrorThrottle, NotificationSink};
use crate::oracle::MarketDataSource;
use crate::persistence::{stamp, InstrumentRecord, StateStore};
use crate::strategy::{
    flow_corroborator, materially_changed, trend_corroborator, AntiScalpGate, ClassifierInput,
    GateDecision, GateInput, RegimeClassifier, StatusSnapshot, StatusThrottle, StatusTolerance,
    Vote,
};
use crate::types::{closes, Instrument, Regime, Timeframe};

use messages::SignalView;

/// Result of one polling cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub processed: usize,
    pub failed: usize,
    /// Signals sent this cycle
    pub emitted: Vec<(Instrument, Regime)>,
    /// Shutdown was requested before every instrument ran
    pub interrupted: bool,
}

pub struct Monitor {
    instruments: Vec<Instrument>,
    short_tf: Timeframe,
    long_tf: Timeframe,
    kline_limit: usize,
    poll_interval: Duration,
    heartbeat_ms: i64,
    heartbeat_hours: u64,
    startup_banner: bool,
    status_pings: bool,
    indicators: IndicatorsConfig,
    dispersion_factor: f64,
    band_policy: BandPolicy,
    classifier: RegimeClassifier,
    gate: AntiScalpGate,
    status_tolerance: StatusTolerance,
    status_throttle: StatusThrottle,
    source: Arc<dyn MarketDataSource>,
    notifier: Arc<dyn NotificationSink>,
    store: Box<dyn StateStore>,
    records: BTreeMap<String, InstrumentRecord>,
    tracker: OscillatorTracker,
    errors: ErrorThrottle,
    board: Option<SharedBoard>,
    last_heartbeat: Option<i64>,
    cycles: u64,
}

impl Monitor {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn MarketDataSource>,
        notifier: Arc<dyn NotificationSink>,
        store: Box<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            instruments: config.instruments(),
            short_tf: config.short_timeframe()?,
            long_tf: config.long_timeframe()?,
            kline_limit: config.market_data.kline_limit,
            poll_interval: Duration::from_secs(config.bot.poll_interval_secs),
            heartbeat_ms: config.bot.heartbeat_hours as i64 * 3_600_000,
            heartbeat_hours: config.bot.heartbeat_hours,
            startup_banner: config.bot.startup_banner,
            status_pings: config.bot.status_pings,
            indicators: config.indicators.clone(),
            dispersion_factor: config.bands.dispersion_factor,
            band_policy: config.bands.to_policy(),
            classifier: RegimeClassifier::new(config.classifier.to_classifier()),
            gate: AntiScalpGate::new(config.gate.to_gate()),
            status_tolerance: config.status.to_tolerance(),
            status_throttle: StatusThrottle::new(config.status.min_interval_secs),
            source,
            notifier,
            store,
            records: BTreeMap::new(),
            tracker: OscillatorTracker::new(
                config.indicators.rsi_period,
                config.indicators.history_capacity,
            ),
            errors: ErrorThrottle::new(config.notifier.error_cooldown_secs),
            board: None,
            last_heartbeat: None,
            cycles: 0,
        })
    }

    /// Publish cycle summaries to a shared board
    pub fn with_board(mut self, board: SharedBoard) -> Self {
        self.board = Some(board);
        self
    }

    /// Restore persisted gate state. Records for instruments that are no
    /// longer configured are kept so they survive a config round trip.
    pub fn restore(&mut self) -> Result<usize> {
        let snapshot = self.store.load()?;
        let restored = snapshot.instruments.len();
        self.records = snapshot.instruments;
        Ok(restored)
    }

    pub fn record(&self, instrument: &Instrument) -> Option<&InstrumentRecord> {
        self.records.get(instrument.symbol())
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run until `shutdown` flips to true (or its sender goes away)
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        if self.startup_banner {
            let banner = messages::banner_message(self.heartbeat_hours);
            self.dispatch(&banner).await;
        }
        self.last_heartbeat = Some(now);

        info!(
            instruments = self.instruments.len(),
            poll_secs = self.poll_interval.as_secs(),
            source = self.source.name(),
            notifier = self.notifier.name(),
            "🚀 Monitor loop started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let now = chrono::Utc::now().timestamp_millis();
            let report = self.run_cycle(now, Some(&shutdown)).await;
            if report.interrupted {
                break;
            }
        }

        info!(cycles = self.cycles, "🛑 Monitor loop stopping");
        self.save();
        if let Err(e) = self.notifier.flush().await {
            warn!(error = %e, "Final notifier flush failed");
        }
        Ok(())
    }

    /// One full pass over every instrument at wall-clock `now` (ms)
    pub async fn run_cycle(
        &mut self,
        now: i64,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..Default::default()
        };

        self.heartbeat_if_due(now).await;
        self.errors.prune(now);

        let instruments = self.instruments.clone();
        for instrument in &instruments {
            if shutdown.map(|rx| *rx.borrow()).unwrap_or(false) {
                report.interrupted = true;
                break;
            }

            match self.process_instrument(instrument, now).await {
                Ok((summary, emitted)) => {
                    report.processed += 1;
                    if let Some(regime) = emitted {
                        report.emitted.push((instrument.clone(), regime));
                    }
                    self.publish(summary).await;
                }
                Err(e) => {
                    report.failed += 1;
                    let summary = e.summary();
                    warn!(instrument = %instrument, error = %summary, "Instrument skipped this cycle");
                    if let Some(swallowed) = self.errors.check(instrument, &summary, now) {
                        let text = messages::error_message(instrument, &summary, swallowed);
                        self.dispatch(&text).await;
                    }
                    self.publish(InstrumentSummary::failed(instrument.symbol(), summary, now))
                        .await;
                }
            }
        }

        self.save();
        if let Err(e) = self.notifier.flush().await {
            warn!(error = %e, notifier = self.notifier.name(), "Notifier flush failed");
        }

        if let Some(board) = &self.board {
            let mut board = board.write().await;
            board.cycles = self.cycles;
            board.last_cycle_at = Some(now);
        }

        debug!(
            cycle = report.cycle,
            processed = report.processed,
            failed = report.failed,
            emitted = report.emitted.len(),
            "Cycle complete"
        );
        report
    }

    async fn process_instrument(
        &mut self,
        instrument: &Instrument,
        now: i64,
    ) -> Result<(InstrumentSummary, Option<Regime>), EngineError> {
        let source = Arc::clone(&self.source);
        let price = source.fetch_live_price(instrument).await?.price;
        let short_candles = source
            .fetch_closed_candles(instrument, self.short_tf, self.kline_limit)
            .await?;
        let long_candles = source
            .fetch_closed_candles(instrument, self.long_tf, self.kline_limit)
            .await?;

        let short = self
            .tracker
            .update(instrument, self.short_tf, &short_candles)
            .map_err(|source| EngineError::Indicator {
                timeframe: self.short_tf,
                source,
            })?;
        let long = self
            .tracker
            .update(instrument, self.long_tf, &long_candles)
            .map_err(|source| EngineError::Indicator {
                timeframe: self.long_tf,
                source,
            })?;

        let short_bands = compute_bands(&short.history, self.dispersion_factor, &self.band_policy);
        let long_bands = compute_bands(&long.history, self.dispersion_factor, &self.band_policy);

        let short_closes = closes(&short_candles);
        let trend = trend_corroborator(
            &short_closes,
            self.indicators.ema_period,
            self.indicators.trend_weight,
        );
        let mut corroborators = Vec::new();
        if self.indicators.trend_enabled {
            corroborators.extend(trend.clone());
        }
        if self.indicators.flow_enabled {
            corroborators.extend(flow_corroborator(
                &short_candles,
                self.indicators.flow_lookback,
                self.indicators.flow_weight,
            ));
        }

        let classification = self.classifier.classify_detailed(&ClassifierInput {
            short_rsi: short.value,
            long_rsi: long.value,
            short_bands,
            long_bands,
            corroborators,
        });
        let candidate = classification.regime;

        let mut record = self
            .records
            .remove(instrument.symbol())
            .unwrap_or_default();
        let (decision, next) = self.gate.evaluate(
            &record.gate,
            GateInput {
                candidate,
                price,
                now,
            },
        );
        record.gate = next;

        let mut emitted = None;
        match decision {
            GateDecision::Seeded { regime } => {
                info!(instrument = %instrument, regime = %regime, "🌱 Gate seeded");
            }
            GateDecision::Emit { regime, previous } => {
                info!(
                    instrument = %instrument,
                    regime = %regime,
                    previous = %previous,
                    price,
                    short_rsi = short.value,
                    long_rsi = long.value,
                    "📣 Regime change confirmed"
                );
                let text = messages::signal_message(
                    &SignalView {
                        instrument,
                        short_tf: self.short_tf,
                        long_tf: self.long_tf,
                        short_rsi: short.value,
                        long_rsi: long.value,
                        price,
                        regime,
                        previous,
                        now,
                    },
                    self.gate.config(),
                );
                self.dispatch(&text).await;
                emitted = Some(regime);
            }
            GateDecision::Suppressed(reason) => {
                debug!(
                    instrument = %instrument,
                    candidate = %candidate,
                    long_votes = classification.tally.long,
                    short_votes = classification.tally.short,
                    reason = %reason,
                    "Signal suppressed"
                );
            }
        }

        let snapshot = StatusSnapshot {
            price,
            short_rsi: short.value,
            long_rsi: long.value,
            trend_up: trend.as_ref().map(|c| c.vote == Vote::Long).unwrap_or(false),
            ts: now,
        };
        if emitted.is_some() {
            // The signal already carried these readings
            record.last_status = Some(snapshot);
            record.last_status_at = Some(now);
        } else if self.status_pings
            && materially_changed(&snapshot, record.last_status.as_ref(), &self.status_tolerance)
            && self.status_throttle.allows(record.last_status_at, now)
        {
            let text = messages::status_message(
                instrument,
                price,
                (self.short_tf, short.value),
                (self.long_tf, long.value),
                snapshot.trend_up,
                candidate,
            );
            self.dispatch(&text).await;
            record.last_status = Some(snapshot);
            record.last_status_at = Some(now);
        }

        let summary = InstrumentSummary {
            instrument: instrument.symbol().to_string(),
            price: Some(price),
            short_rsi: Some(short.value),
            long_rsi: Some(long.value),
            short_bands: Some(short_bands),
            long_bands: Some(long_bands),
            candidate: Some(candidate),
            last_emitted: record.gate.last_emitted(),
            phase: record.gate.phase(now, self.gate.config()),
            decision: describe(&decision),
            last_error: None,
            updated_at: now,
        };
        self.records.insert(instrument.symbol().to_string(), record);

        Ok((summary, emitted))
    }

    async fn heartbeat_if_due(&mut self, now: i64) {
        if self.heartbeat_ms <= 0 {
            return;
        }
        let due = match self.last_heartbeat {
            Some(last) => now - last >= self.heartbeat_ms,
            None => true,
        };
        if due {
            self.last_heartbeat = Some(now);
            let text = messages::heartbeat_message(&self.instruments, self.cycles);
            self.dispatch(&text).await;
        }
    }

    /// Best effort: failures are logged and go no further
    async fn dispatch(&self, text: &str) {
        if let Err(e) = self.notifier.notify(text).await {
            warn!(error = %e, notifier = self.notifier.name(), "Notification failed");
        }
    }

    async fn publish(&self, summary: InstrumentSummary) {
        if let Some(board) = &self.board {
            board.write().await.record(summary);
        }
    }

    fn save(&self) {
        if let Err(e) = self.store.save(&stamp(self.records.clone())) {
            warn!(error = %e, "Failed to save gate state");
        }
    }
}

fn describe(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Seeded { regime } => format!("seeded ({})", regime),
        GateDecision::Emit { regime, previous } => format!("emitted {} (was {})", regime, previous),
        GateDecision::Suppressed(reason) => reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataError, NotifyError};
    use crate::oracle::MockMarketDataSource;
    use crate::persistence::MemoryStateStore;
    use crate::strategy::GateState;
    use crate::types::{Candle, PriceSample};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const T0: i64 = 1_700_000_000_000;
    const MIN: i64 = 60_000;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Lets a test keep a handle on what the monitor saved
    struct SharedStore(Arc<MemoryStateStore>);

    impl StateStore for SharedStore {
        fn load(&self) -> Result<crate::persistence::StateSnapshot> {
            self.0.load()
        }
        fn save(&self, snapshot: &crate::persistence::StateSnapshot) -> Result<()> {
            self.0.save(snapshot)
        }
    }

    fn candles(timeframe: Timeframe, closes: &[f64]) -> Vec<Candle> {
        let step = timeframe.duration_secs() as i64 * 1000;
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: T0 + i as i64 * step,
                close_time: T0 + (i as i64 + 1) * step - 1,
                timeframe,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                trades: 1,
            })
            .collect()
    }

    /// Zig-zag that ends on a strong rally
    fn rally(len: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(len);
        let mut price = 100.0;
        for i in 0..len {
            if i + 10 >= len {
                price += 3.0;
            } else if i % 2 == 0 {
                price += 1.0;
            } else {
                price -= 1.0;
            }
            out.push(price);
        }
        out
    }

    fn test_config() -> AppConfig {
        let mut cfg = AppConfig::defaults().unwrap();
        cfg.bot.instruments = vec!["BTCUSDT".to_string()];
        cfg.bot.heartbeat_hours = 0;
        cfg.market_data.kline_limit = 60;
        cfg.indicators.trend_enabled = false;
        cfg.indicators.flow_enabled = false;
        cfg.gate.confirm_cycles = 2;
        cfg.gate.min_move_pct = 0.0;
        cfg
    }

    fn rally_source(price: f64) -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch_live_price().returning(move |instrument| {
            Ok(PriceSample {
                instrument: instrument.clone(),
                price,
                ts: T0,
            })
        });
        source
            .expect_fetch_closed_candles()
            .returning(|_, timeframe, _| Ok(candles(timeframe, &rally(60))));
        source
    }

    #[tokio::test]
    async fn test_first_cycle_only_seeds() {
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = Monitor::new(
            &test_config(),
            Arc::new(rally_source(130.0)),
            sink.clone(),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();

        let report = monitor.run_cycle(T0, None).await;
        assert_eq!(report.processed, 1);
        assert!(report.emitted.is_empty());
        assert!(sink.messages().is_empty());

        let record = monitor.record(&Instrument::new("BTCUSDT")).unwrap();
        assert!(matches!(record.gate, GateState::Tracking(_)));
    }

    #[tokio::test]
    async fn test_confirmed_change_is_emitted_once() {
        let sink = Arc::new(RecordingSink::default());
        let btc = Instrument::new("BTCUSDT");
        let mut monitor = Monitor::new(
            &test_config(),
            Arc::new(rally_source(130.0)),
            sink.clone(),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();

        // Seed as WAIT so the rally is a change
        monitor.records.insert(
            btc.symbol().to_string(),
            InstrumentRecord {
                gate: AntiScalpGate::default()
                    .evaluate(
                        &GateState::Uninitialized,
                        GateInput {
                            candidate: Regime::Wait,
                            price: 100.0,
                            now: T0,
                        },
                    )
                    .1,
                ..Default::default()
            },
        );

        let first = monitor.run_cycle(T0 + MIN, None).await;
        assert!(first.emitted.is_empty());
        let second = monitor.run_cycle(T0 + 2 * MIN, None).await;
        assert_eq!(second.emitted, vec![(btc.clone(), Regime::Long)]);
        let third = monitor.run_cycle(T0 + 3 * MIN, None).await;
        assert!(third.emitted.is_empty());

        let sent = sink.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Decision: LONG"));
        assert_eq!(
            monitor.record(&btc).unwrap().gate.last_emitted(),
            Some(Regime::Long)
        );
    }

    #[tokio::test]
    async fn test_failing_instrument_is_isolated() {
        let mut cfg = test_config();
        cfg.bot.instruments = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];

        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch_live_price().returning(|instrument| {
            if instrument.symbol() == "BTCUSDT" {
                Err(DataError::Status {
                    status: 503,
                    message: "maintenance".to_string(),
                })
            } else {
                Ok(PriceSample {
                    instrument: instrument.clone(),
                    price: 3000.0,
                    ts: T0,
                })
            }
        });
        source
            .expect_fetch_closed_candles()
            .returning(|_, timeframe, _| Ok(candles(timeframe, &rally(60))));

        let sink = Arc::new(RecordingSink::default());
        let mut monitor = Monitor::new(
            &cfg,
            Arc::new(source),
            sink.clone(),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();

        let report = monitor.run_cycle(T0, None).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert!(monitor.record(&Instrument::new("BTCUSDT")).is_none());
        assert!(monitor.record(&Instrument::new("ETHUSDT")).is_some());

        // The warning goes out once, the repeat is swallowed
        monitor.run_cycle(T0 + MIN, None).await;
        let warnings: Vec<String> = sink
            .messages()
            .into_iter()
            .filter(|m| m.contains("BTCUSDT"))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("maintenance"));
    }

    #[tokio::test]
    async fn test_flaky_instrument_warns_once_per_cooldown() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        let mut calls = 0u32;
        source.expect_fetch_live_price().returning(move |instrument| {
            calls += 1;
            if calls % 2 == 1 {
                Err(DataError::Status {
                    status: 503,
                    message: "maintenance".to_string(),
                })
            } else {
                Ok(PriceSample {
                    instrument: instrument.clone(),
                    price: 130.0,
                    ts: T0,
                })
            }
        });
        source
            .expect_fetch_closed_candles()
            .returning(|_, timeframe, _| Ok(candles(timeframe, &rally(60))));

        let mut cfg = test_config();
        cfg.notifier.error_cooldown_secs = 900;
        let sink = Arc::new(RecordingSink::default());
        let mut monitor = Monitor::new(
            &cfg,
            Arc::new(source),
            sink.clone(),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();

        let mut failed = 0;
        for i in 0..10 {
            failed += monitor.run_cycle(T0 + i * MIN, None).await.failed;
        }
        assert_eq!(failed, 5);

        let warnings = sink
            .messages()
            .iter()
            .filter(|m| m.contains("maintenance"))
            .count();
        assert_eq!(warnings, 1);

        // Past the cooldown the next failure is reported with its repeats
        for i in 15..17 {
            monitor.run_cycle(T0 + i * MIN, None).await;
        }
        let warnings: Vec<String> = sink
            .messages()
            .into_iter()
            .filter(|m| m.contains("maintenance"))
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("+4 repeats suppressed"));
    }

    fn stepped_source(prices: Vec<f64>) -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        let mut next = 0usize;
        source.expect_fetch_live_price().returning(move |instrument| {
            let price = prices[next.min(prices.len() - 1)];
            next += 1;
            Ok(PriceSample {
                instrument: instrument.clone(),
                price,
                ts: T0,
            })
        });
        source
            .expect_fetch_closed_candles()
            .returning(|_, timeframe, _| Ok(candles(timeframe, &rally(60))));
        source
    }

    fn status_pings(sink: &RecordingSink) -> usize {
        sink.messages().iter().filter(|m| m.starts_with("ℹ️")).count()
    }

    #[tokio::test]
    async fn test_status_pings_are_throttled_and_persisted() {
        let mut cfg = test_config();
        cfg.bot.status_pings = true;
        cfg.status.price_tolerance_pct = 1.0;
        cfg.status.rsi_tolerance = 5.0;
        cfg.status.min_interval_secs = 600;

        let store = Arc::new(MemoryStateStore::new());
        let sink = Arc::new(RecordingSink::default());
        let btc = Instrument::new("BTCUSDT");
        let mut monitor = Monitor::new(
            &cfg,
            Arc::new(stepped_source(vec![130.0, 140.0, 140.0, 140.0])),
            sink.clone(),
            Box::new(SharedStore(store.clone())),
        )
        .unwrap();

        // First look always reports
        monitor.run_cycle(T0, None).await;
        assert_eq!(status_pings(&sink), 1);

        // Material move, but inside the minimum interval
        monitor.run_cycle(T0 + MIN, None).await;
        assert_eq!(status_pings(&sink), 1);

        // Interval elapsed and still moved against the last ping
        monitor.run_cycle(T0 + 11 * MIN, None).await;
        assert_eq!(status_pings(&sink), 2);

        // Nothing changed since
        monitor.run_cycle(T0 + 22 * MIN, None).await;
        assert_eq!(status_pings(&sink), 2);

        let record = monitor.record(&btc).unwrap();
        assert_eq!(record.last_status_at, Some(T0 + 11 * MIN));
        assert_eq!(record.last_status.as_ref().map(|s| s.price), Some(140.0));

        let saved = store.saved().unwrap();
        assert_eq!(saved.instruments.get("BTCUSDT"), Some(record));
    }

    #[tokio::test]
    async fn test_no_status_ping_repeats_a_signal() {
        let mut cfg = test_config();
        cfg.bot.status_pings = true;
        cfg.status.min_interval_secs = 0;

        let sink = Arc::new(RecordingSink::default());
        let btc = Instrument::new("BTCUSDT");
        let mut monitor = Monitor::new(
            &cfg,
            Arc::new(stepped_source(vec![130.0, 140.0, 140.0])),
            sink.clone(),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();
        monitor.records.insert(
            btc.symbol().to_string(),
            InstrumentRecord {
                gate: AntiScalpGate::default()
                    .evaluate(
                        &GateState::Uninitialized,
                        GateInput {
                            candidate: Regime::Wait,
                            price: 100.0,
                            now: T0,
                        },
                    )
                    .1,
                ..Default::default()
            },
        );

        monitor.run_cycle(T0 + MIN, None).await;
        assert_eq!(status_pings(&sink), 1);

        let second = monitor.run_cycle(T0 + 2 * MIN, None).await;
        assert_eq!(second.emitted, vec![(btc.clone(), Regime::Long)]);
        let record = monitor.record(&btc).unwrap();
        assert_eq!(record.last_status_at, Some(T0 + 2 * MIN));

        // Same readings as the signal: no follow-up ping
        monitor.run_cycle(T0 + 3 * MIN, None).await;
        assert_eq!(status_pings(&sink), 1);
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_history_skips_without_state() {
        let mut source = MockMarketDataSource::new();
        source.expect_name().return_const("mock");
        source.expect_fetch_live_price().returning(|instrument| {
            Ok(PriceSample {
                instrument: instrument.clone(),
                price: 100.0,
                ts: T0,
            })
        });
        source
            .expect_fetch_closed_candles()
            .returning(|_, timeframe, _| Ok(candles(timeframe, &[100.0, 101.0, 102.0])));

        let mut monitor = Monitor::new(
            &test_config(),
            Arc::new(source),
            Arc::new(RecordingSink::default()),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();

        let report = monitor.run_cycle(T0, None).await;
        assert_eq!(report.failed, 1);
        assert!(monitor.record(&Instrument::new("BTCUSDT")).is_none());
    }

    #[tokio::test]
    async fn test_state_is_saved_and_restored() {
        let store = Arc::new(MemoryStateStore::new());

        let mut monitor = Monitor::new(
            &test_config(),
            Arc::new(rally_source(130.0)),
            Arc::new(RecordingSink::default()),
            Box::new(SharedStore(store.clone())),
        )
        .unwrap();
        monitor.run_cycle(T0, None).await;

        let saved = store.saved().unwrap();
        assert!(saved.instruments.contains_key("BTCUSDT"));

        let mut restarted = Monitor::new(
            &test_config(),
            Arc::new(rally_source(130.0)),
            Arc::new(RecordingSink::default()),
            Box::new(SharedStore(store.clone())),
        )
        .unwrap();
        assert_eq!(restarted.restore().unwrap(), 1);
        assert_eq!(
            restarted.record(&Instrument::new("BTCUSDT")),
            saved.instruments.get("BTCUSDT")
        );
    }

    #[tokio::test]
    async fn test_heartbeat_and_board() {
        let mut cfg = test_config();
        cfg.bot.heartbeat_hours = 2;
        let sink = Arc::new(RecordingSink::default());
        let board = shared_board(T0);
        let mut monitor = Monitor::new(
            &cfg,
            Arc::new(rally_source(130.0)),
            sink.clone(),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap()
        .with_board(board.clone());

        monitor.run_cycle(T0, None).await;
        monitor.run_cycle(T0 + 60 * MIN, None).await;
        monitor.run_cycle(T0 + 120 * MIN, None).await;

        let beats = sink
            .messages()
            .iter()
            .filter(|m| m.contains("alive"))
            .count();
        assert_eq!(beats, 2);

        let board = board.read().await;
        assert_eq!(board.cycles, 3);
        assert!(board.instruments.contains_key("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_cycle() {
        let mut cfg = test_config();
        cfg.bot.instruments = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let mut monitor = Monitor::new(
            &cfg,
            Arc::new(rally_source(130.0)),
            Arc::new(RecordingSink::default()),
            Box::new(MemoryStateStore::new()),
        )
        .unwrap();

        let (tx, rx) = watch::channel(true);
        let report = monitor.run_cycle(T0, Some(&rx)).await;
        assert!(report.interrupted);
        assert_eq!(report.processed, 0);
        drop(tx);
    }
}
