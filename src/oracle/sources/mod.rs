//! Market data source implementations

mod binance;

pub use binance::BinanceRestClient;
