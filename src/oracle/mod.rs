//! Oracle module - Market data collaborator
//!
//! Supplies closed candle series and live prices to the decision engine.
//! Implementations must never hand out a candle whose period is still open.

mod candles;
mod retry;
pub mod sources;

pub use candles::{retain_closed, validate_series};
pub use retry::RetryPolicy;
pub use sources::BinanceRestClient;

use async_trait::async_trait;

use crate::error::DataError;
use crate::types::{Candle, Instrument, PriceSample, Timeframe};

/// Source of closes and live prices
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Up to `count` most recent completed candles, oldest first
    async fn fetch_closed_candles(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, DataError>;

    /// Current live price
    async fn fetch_live_price(&self, instrument: &Instrument) -> Result<PriceSample, DataError>;
}
