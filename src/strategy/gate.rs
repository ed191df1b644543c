//! Anti-scalping gate
//!
//! Explicit per-instrument state machine deciding whether a raw regime from
//! the classifier becomes an outbound signal. Four independent filters are
//! ANDed: persistence confirmation, cooldown after an emission, a minimum gap
//! between signals, and a minimum price move since the last signal.
//!
//! `AntiScalpGate::evaluate` is a pure transition `(state, input) ->
//! (decision, state)`; no clocks, no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Regime;

/// Gate tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Consecutive cycles a new candidate must hold (P)
    pub confirm_cycles: u32,
    /// Hard quiet period after each emission, in milliseconds
    pub cooldown_ms: i64,
    /// Minimum time between two emissions, in milliseconds
    pub min_gap_ms: i64,
    /// Minimum price move since the last emission, in percent
    pub min_move_pct: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confirm_cycles: 3,
            cooldown_ms: 30 * 60 * 1000,
            min_gap_ms: 45 * 60 * 1000,
            min_move_pct: 0.3,
        }
    }
}

/// Fields tracked once an instrument has been observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingState {
    /// Last regime that produced a notification (or the seeding regime)
    pub last_emitted: Regime,
    /// Previous cycle's candidate
    pub last_candidate: Regime,
    /// Consecutive cycles the pending candidate has held, capped at P
    pub persist_count: u32,
    /// No emission before this timestamp (ms); 0 when never set
    pub cooldown_until: i64,
    pub last_signal_time: Option<i64>,
    pub last_signal_price: Option<f64>,
}

impl TrackingState {
    fn seeded(regime: Regime) -> Self {
        Self {
            last_emitted: regime,
            last_candidate: regime,
            persist_count: 0,
            cooldown_until: 0,
            last_signal_time: None,
            last_signal_price: None,
        }
    }

    pub fn in_cooldown(&self, now: i64) -> bool {
        now < self.cooldown_until
    }
}

/// Persisted gate state per instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateState {
    Uninitialized,
    Tracking(TrackingState),
}

impl Default for GateState {
    fn default() -> Self {
        GateState::Uninitialized
    }
}

/// Sub-state of a tracked instrument, inferred from its fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    Cooldown,
    Confirming,
    Armed,
}

impl GateState {
    pub fn tracking(&self) -> Option<&TrackingState> {
        match self {
            GateState::Uninitialized => None,
            GateState::Tracking(s) => Some(s),
        }
    }

    pub fn last_emitted(&self) -> Option<Regime> {
        self.tracking().map(|s| s.last_emitted)
    }

    /// `None` while uninitialized
    pub fn phase(&self, now: i64, config: &GateConfig) -> Option<GatePhase> {
        let s = self.tracking()?;
        Some(if s.in_cooldown(now) {
            GatePhase::Cooldown
        } else if s.persist_count >= config.confirm_cycles.max(1) {
            GatePhase::Armed
        } else {
            GatePhase::Confirming
        })
    }
}

/// One polling cycle's observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateInput {
    pub candidate: Regime,
    pub price: f64,
    /// Wall-clock time in milliseconds
    pub now: i64,
}

/// Why a cycle did not emit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuppressReason {
    Cooldown { remaining_ms: i64 },
    NoRegimeChange,
    InsufficientPersistence { count: u32, required: u32 },
    MinGapNotElapsed { remaining_ms: i64 },
    InsufficientMove { move_pct: f64, required_pct: f64 },
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::Cooldown { remaining_ms } => {
                write!(f, "in cooldown ({}s left)", remaining_ms / 1000)
            }
            SuppressReason::NoRegimeChange => write!(f, "no regime change"),
            SuppressReason::InsufficientPersistence { count, required } => {
                write!(f, "insufficient persistence ({}/{})", count, required)
            }
            SuppressReason::MinGapNotElapsed { remaining_ms } => {
                write!(f, "minimum gap not elapsed ({}s left)", remaining_ms / 1000)
            }
            SuppressReason::InsufficientMove {
                move_pct,
                required_pct,
            } => write!(
                f,
                "insufficient price movement ({:.3}% < {:.3}%)",
                move_pct, required_pct
            ),
        }
    }
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// First observation: state seeded, nothing to compare against
    Seeded { regime: Regime },
    /// Confirmed regime change: send the signal
    Emit { regime: Regime, previous: Regime },
    Suppressed(SuppressReason),
}

impl GateDecision {
    pub fn emits(&self) -> bool {
        matches!(self, GateDecision::Emit { .. })
    }
}

/// Anti-scalping gate
#[derive(Debug, Clone, Default)]
pub struct AntiScalpGate {
    config: GateConfig,
}

impl AntiScalpGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Pure transition. Deterministic in `(state, input)`.
    pub fn evaluate(&self, state: &GateState, input: GateInput) -> (GateDecision, GateState) {
        let mut s = match state {
            GateState::Uninitialized => {
                return (
                    GateDecision::Seeded {
                        regime: input.candidate,
                    },
                    GateState::Tracking(TrackingState::seeded(input.candidate)),
                );
            }
            GateState::Tracking(s) => s.clone(),
        };
        let required = self.config.confirm_cycles.max(1);
        let previous_candidate = s.last_candidate;
        s.last_candidate = input.candidate;

        if s.in_cooldown(input.now) {
            s.persist_count = 0;
            let reason = SuppressReason::Cooldown {
                remaining_ms: s.cooldown_until - input.now,
            };
            return (GateDecision::Suppressed(reason), GateState::Tracking(s));
        }

        if input.candidate == s.last_emitted {
            s.persist_count = 0;
            return (
                GateDecision::Suppressed(SuppressReason::NoRegimeChange),
                GateState::Tracking(s),
            );
        }

        s.persist_count = if input.candidate == previous_candidate {
            s.persist_count.saturating_add(1).min(required)
        } else {
            1
        };

        if s.persist_count < required {
            let reason = SuppressReason::InsufficientPersistence {
                count: s.persist_count,
                required,
            };
            return (GateDecision::Suppressed(reason), GateState::Tracking(s));
        }

        if let Some(last_time) = s.last_signal_time {
            let elapsed = input.now - last_time;
            if elapsed < self.config.min_gap_ms {
                let reason = SuppressReason::MinGapNotElapsed {
                    remaining_ms: self.config.min_gap_ms - elapsed,
                };
                return (GateDecision::Suppressed(reason), GateState::Tracking(s));
            }
        }

        // A non-positive reference price cannot express a relative move
        if let Some(last_price) = s.last_signal_price.filter(|p| *p > 0.0) {
            let move_pct = (input.price - last_price).abs() / last_price * 100.0;
            if move_pct < self.config.min_move_pct {
                let reason = SuppressReason::InsufficientMove {
                    move_pct,
                    required_pct: self.config.min_move_pct,
                };
                return (GateDecision::Suppressed(reason), GateState::Tracking(s));
            }
        }

        let previous = s.last_emitted;
        s.last_emitted = input.candidate;
        s.last_signal_time = Some(input.now);
        s.last_signal_price = Some(input.price);
        s.cooldown_until = input.now.saturating_add(self.config.cooldown_ms);
        s.persist_count = 0;

        (
            GateDecision::Emit {
                regime: input.candidate,
                previous,
            },
            GateState::Tracking(s),
        )
    }
}
