//! Error taxonomy for the decision engine and its collaborators

use thiserror::Error;

use crate::types::{Instrument, Timeframe};

/// Failures computing indicators from a candle series
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("insufficient data: {available} closes, need more than {period}")]
    InsufficientData { available: usize, period: usize },

    #[error("oscillator period must be positive")]
    InvalidPeriod,
}

/// Market data failures. Always transient from the engine's point of view:
/// the instrument is skipped for the current cycle.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API response error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("unparseable payload: {0}")]
    Parse(String),

    #[error("empty payload for {instrument} {timeframe}")]
    Empty {
        instrument: Instrument,
        timeframe: Timeframe,
    },

    #[error("price not available for {0}")]
    Unavailable(Instrument),
}

/// Notification path failures. Never escalate into signal logic.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notifier credentials missing: {0}")]
    MissingCredentials(&'static str),

    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected: {status} - {message}")]
    Rejected { status: u16, message: String },
}

/// Per-instrument processing failure inside a polling cycle
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("data unavailable: {0}")]
    Data(#[from] DataError),

    #[error("{timeframe} oscillator: {source}")]
    Indicator {
        timeframe: Timeframe,
        #[source]
        source: IndicatorError,
    },
}

impl EngineError {
    /// Short, stable text used for deduplicating repeated warnings
    pub fn summary(&self) -> String {
        let text = self.to_string();
        text.chars().take(120).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_truncated() {
        let err = EngineError::Data(DataError::Parse("x".repeat(500)));
        assert_eq!(err.summary().chars().count(), 120);
    }

    #[test]
    fn indicator_error_names_timeframe() {
        let err = EngineError::Indicator {
            timeframe: Timeframe::Hour4,
            source: IndicatorError::InsufficientData {
                available: 10,
                period: 14,
            },
        };
        let text = err.to_string();
        assert!(text.contains("4h"));
        assert!(text.contains("insufficient data"));
    }
}
