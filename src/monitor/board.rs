//! Read-only view of the latest cycle, published for the liveness endpoint

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::features::Bands;
use crate::strategy::gate::GatePhase;
use crate::types::Regime;

/// What the last cycle saw for one instrument
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSummary {
    pub instrument: String,
    pub price: Option<f64>,
    pub short_rsi: Option<f64>,
    pub long_rsi: Option<f64>,
    pub short_bands: Option<Bands>,
    pub long_bands: Option<Bands>,
    /// Raw classifier output
    pub candidate: Option<Regime>,
    /// Last regime the gate let through
    pub last_emitted: Option<Regime>,
    pub phase: Option<GatePhase>,
    /// Gate decision, human readable
    pub decision: String,
    pub last_error: Option<String>,
    pub updated_at: i64,
}

impl InstrumentSummary {
    pub fn failed(instrument: &str, error: String, updated_at: i64) -> Self {
        Self {
            instrument: instrument.to_string(),
            price: None,
            short_rsi: None,
            long_rsi: None,
            short_bands: None,
            long_bands: None,
            candidate: None,
            last_emitted: None,
            phase: None,
            decision: "skipped".to_string(),
            last_error: Some(error),
            updated_at,
        }
    }
}

/// Loop counters plus per-instrument summaries
#[derive(Debug, Clone, Serialize)]
pub struct StatusBoard {
    pub started_at: i64,
    pub cycles: u64,
    pub last_cycle_at: Option<i64>,
    pub instruments: BTreeMap<String, InstrumentSummary>,
}

impl StatusBoard {
    pub fn new(started_at: i64) -> Self {
        Self {
            started_at,
            cycles: 0,
            last_cycle_at: None,
            instruments: BTreeMap::new(),
        }
    }

    /// Merge a summary; a failure keeps the last good readings
    pub fn record(&mut self, summary: InstrumentSummary) {
        if summary.last_error.is_some() {
            if let Some(existing) = self.instruments.get_mut(&summary.instrument) {
                existing.last_error = summary.last_error;
                existing.decision = summary.decision;
                existing.updated_at = summary.updated_at;
                return;
            }
        }
        self.instruments.insert(summary.instrument.clone(), summary);
    }

    pub fn uptime_secs(&self, now: i64) -> i64 {
        ((now - self.started_at) / 1000).max(0)
    }
}

/// Shared handle: written by the monitor, read by the HTTP server
pub type SharedBoard = Arc<RwLock<StatusBoard>>;

pub fn shared_board(started_at: i64) -> SharedBoard {
    Arc::new(RwLock::new(StatusBoard::new(started_at)))
}
