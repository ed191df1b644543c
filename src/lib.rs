//! RegimeWatch Library
//!
//! Read-only RSI regime monitor: multi-timeframe RSI against adaptive bands,
//! a voting classifier, and an anti-scalping gate in front of every alert.

pub mod config;
pub mod error;
pub mod features;
pub mod monitor;
pub mod notify;
pub mod oracle;
pub mod persistence;
pub mod strategy;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;
