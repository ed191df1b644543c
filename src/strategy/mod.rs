//! Strategy Engine - Regime classification and alert gating
//!
//! - Regime classifier: weighted voting (canonical) or plain thresholds
//!   over multi-timeframe RSI against adaptive bands
//! - Anti-scalping gate: decides whether a raw regime becomes an alert
//! - Status change detector: decides whether an informational ping is worth
//!   sending

pub mod gate;
pub mod status;

pub use gate::{AntiScalpGate, GateConfig, GateDecision, GateInput, GateState, SuppressReason, TrackingState};
pub use status::{materially_changed, StatusSnapshot, StatusThrottle, StatusTolerance};

use serde::{Deserialize, Serialize};

use crate::features::{self, Bands};
use crate::types::{Candle, Regime};

/// Classifier variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// Weighted votes with quorum and strict majority
    Voting,
    /// Short-term band break confirmed by the long timeframe
    Threshold,
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    /// Weight one side needs before it can win
    pub min_votes: f64,
    /// Short-term RSI beyond its band
    pub band_weight: f64,
    /// Short-term RSI on one side of its band midpoint
    pub bias_weight: f64,
    /// Long-term RSI on one side of its band midpoint
    pub long_weight: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Voting,
            min_votes: 3.0,
            band_weight: 1.0,
            bias_weight: 1.0,
            long_weight: 1.0,
        }
    }
}

/// One directional vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Long,
    Short,
    Abstain,
}

impl Vote {
    /// Vote by sign; zero abstains
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Vote::Long
        } else if value < 0.0 {
            Vote::Short
        } else {
            Vote::Abstain
        }
    }
}

/// Auxiliary evidence (trend, volume flow, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Corroborator {
    pub name: &'static str,
    pub vote: Vote,
    pub weight: f64,
}

impl Corroborator {
    pub fn new(name: &'static str, vote: Vote, weight: f64) -> Self {
        Self { name, vote, weight }
    }
}

/// Trend vote: last close above/below its EMA
pub fn trend_corroborator(closes: &[f64], ema_period: usize, weight: f64) -> Option<Corroborator> {
    let last = *closes.last()?;
    let ema = features::ema(closes, ema_period)?;
    Some(Corroborator::new("trend", Vote::from_sign(last - ema), weight))
}

/// Flow vote: sign of the signed-volume slope
pub fn flow_corroborator(candles: &[Candle], lookback: usize, weight: f64) -> Option<Corroborator> {
    let slope = features::flow_slope(candles, lookback)?;
    Some(Corroborator::new("flow", Vote::from_sign(slope), weight))
}

/// Everything the classifier looks at for one instrument
#[derive(Debug, Clone)]
pub struct ClassifierInput {
    pub short_rsi: f64,
    pub long_rsi: f64,
    pub short_bands: Bands,
    pub long_bands: Bands,
    pub corroborators: Vec<Corroborator>,
}

/// Weighted vote totals
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoteTally {
    pub long: f64,
    pub short: f64,
    /// Non-abstaining votes
    pub active: usize,
}

impl VoteTally {
    fn cast(&mut self, vote: Vote, weight: f64) {
        match vote {
            Vote::Long => self.long += weight,
            Vote::Short => self.short += weight,
            Vote::Abstain => return,
        }
        self.active += 1;
    }
}

/// Classifier verdict with the tally that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub regime: Regime,
    pub tally: VoteTally,
}

/// Deterministic regime classifier
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: ClassifierConfig,
}

impl RegimeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, input: &ClassifierInput) -> Regime {
        self.classify_detailed(input).regime
    }

    pub fn classify_detailed(&self, input: &ClassifierInput) -> Classification {
        match self.config.mode {
            ClassifierMode::Voting => self.classify_voting(input),
            ClassifierMode::Threshold => Classification {
                regime: Self::classify_threshold(input),
                tally: VoteTally::default(),
            },
        }
    }

    fn classify_threshold(input: &ClassifierInput) -> Regime {
        let long_mid = input.long_bands.midpoint();
        if input.short_rsi > input.short_bands.upper && input.long_rsi > long_mid {
            Regime::Long
        } else if input.short_rsi < input.short_bands.lower && input.long_rsi < long_mid {
            Regime::Short
        } else {
            Regime::Wait
        }
    }

    fn classify_voting(&self, input: &ClassifierInput) -> Classification {
        let cfg = &self.config;
        let mut tally = VoteTally::default();

        let band_vote = if input.short_rsi > input.short_bands.upper {
            Vote::Long
        } else if input.short_rsi < input.short_bands.lower {
            Vote::Short
        } else {
            Vote::Abstain
        };
        tally.cast(band_vote, cfg.band_weight);
        tally.cast(
            Vote::from_sign(input.short_rsi - input.short_bands.midpoint()),
            cfg.bias_weight,
        );
        tally.cast(
            Vote::from_sign(input.long_rsi - input.long_bands.midpoint()),
            cfg.long_weight,
        );
        for c in &input.corroborators {
            tally.cast(c.vote, c.weight);
        }

        // Ties never resolve to a direction
        let regime = if tally.long >= cfg.min_votes && tally.long > tally.short {
            Regime::Long
        } else if tally.short >= cfg.min_votes && tally.short > tally.long {
            Regime::Short
        } else {
            Regime::Wait
        };

        Classification { regime, tally }
    }
}
