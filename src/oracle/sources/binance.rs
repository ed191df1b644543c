//! Binance public REST client (read-only, no API key)
//!
//! Klines from `/api/v3/klines`; live price from `/api/v3/ticker/price`
//! with a fallback to the `/api/v3/ticker/bookTicker` midpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::MarketDataConfig;
use crate::error::DataError;
use crate::oracle::{retain_closed, validate_series, MarketDataSource, RetryPolicy};
use crate::types::{Candle, Instrument, PriceSample, Timeframe};

const KLINES_PATH: &str = "/api/v3/klines";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const BOOK_TICKER_PATH: &str = "/api/v3/ticker/bookTicker";
/// Exchange cap on klines per request
const MAX_KLINES: usize = 1000;

#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BinanceRestClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self, DataError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, DataError> {
        let url = format!("{}{}", self.base_url, path);
        let url = &url;
        let http = &self.http;
        self.retry
            .run(path, move || async move {
                let response = http.get(url).query(query).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(DataError::Status {
                        status: status.as_u16(),
                        message: message.chars().take(200).collect(),
                    });
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| DataError::Parse(e.to_string()))
            })
            .await
    }

    async fn ticker_price(&self, instrument: &Instrument) -> Result<Option<f64>, DataError> {
        let json = self
            .get_json(
                TICKER_PRICE_PATH,
                &[("symbol", instrument.symbol().to_string())],
            )
            .await?;
        Ok(parse_ticker_price(&json, instrument))
    }

    async fn book_ticker_mid(&self, instrument: &Instrument) -> Result<Option<f64>, DataError> {
        let json = self
            .get_json(
                BOOK_TICKER_PATH,
                &[("symbol", instrument.symbol().to_string())],
            )
            .await?;
        Ok(parse_book_ticker(&json, instrument))
    }
}

#[async_trait]
impl MarketDataSource for BinanceRestClient {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn fetch_closed_candles(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, DataError> {
        // One extra row: the last one returned is usually still open
        let limit = (count + 1).min(MAX_KLINES);
        let json = self
            .get_json(
                KLINES_PATH,
                &[
                    ("symbol", instrument.symbol().to_string()),
                    ("interval", timeframe.interval().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let mut candles = parse_klines(&json, timeframe)?;
        validate_series(&mut candles);
        let dropped = retain_closed(&mut candles, chrono::Utc::now().timestamp_millis());
        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }

        if candles.is_empty() {
            return Err(DataError::Empty {
                instrument: instrument.clone(),
                timeframe,
            });
        }

        tracing::debug!(
            instrument = %instrument,
            timeframe = %timeframe,
            count = candles.len(),
            dropped_open = dropped,
            "Klines fetched"
        );
        Ok(candles)
    }

    async fn fetch_live_price(&self, instrument: &Instrument) -> Result<PriceSample, DataError> {
        let primary = match self.ticker_price(instrument).await {
            Ok(price) => price,
            Err(e) => {
                tracing::debug!(instrument = %instrument, error = %e, "ticker/price failed, trying bookTicker");
                None
            }
        };

        let price = match primary {
            Some(price) => Some(price),
            None => self.book_ticker_mid(instrument).await?,
        };

        match price {
            Some(price) => Ok(PriceSample {
                instrument: instrument.clone(),
                price,
                ts: chrono::Utc::now().timestamp_millis(),
            }),
            None => Err(DataError::Unavailable(instrument.clone())),
        }
    }
}

/// Numbers arrive either as JSON numbers or as decimal strings
fn parse_number(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Ticker endpoints answer with an array when the symbol filter is dropped;
/// pick the matching entry, or the first one.
fn pick_symbol<'a>(json: &'a Value, instrument: &Instrument) -> Option<&'a Value> {
    match json {
        Value::Array(items) => items
            .iter()
            .find(|it| it["symbol"].as_str() == Some(instrument.symbol()))
            .or_else(|| items.first()),
        Value::Object(_) => Some(json),
        _ => None,
    }
}

/// Parse `/api/v3/ticker/price`
pub(crate) fn parse_ticker_price(json: &Value, instrument: &Instrument) -> Option<f64> {
    let entry = pick_symbol(json, instrument)?;
    positive(parse_number(&entry["price"]))
}

/// Parse `/api/v3/ticker/bookTicker` into a mid price (or whichever side is present)
pub(crate) fn parse_book_ticker(json: &Value, instrument: &Instrument) -> Option<f64> {
    let entry = pick_symbol(json, instrument)?;
    let bid = positive(parse_number(&entry["bidPrice"]));
    let ask = positive(parse_number(&entry["askPrice"]));
    match (bid, ask) {
        (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
        (Some(bid), None) => Some(bid),
        (None, Some(ask)) => Some(ask),
        (None, None) => None,
    }
}

/// Parse `/api/v3/klines`:
/// `[[open_time, open, high, low, close, volume, close_time, _, trades, ...], ...]`
pub(crate) fn parse_klines(json: &Value, timeframe: Timeframe) -> Result<Vec<Candle>, DataError> {
    let rows = json
        .as_array()
        .ok_or_else(|| DataError::Parse("klines payload is not an array".to_string()))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            parse_kline_row(row, timeframe)
                .ok_or_else(|| DataError::Parse(format!("malformed kline row {}", i)))
        })
        .collect()
}

fn parse_kline_row(row: &Value, timeframe: Timeframe) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 7 {
        return None;
    }

    Some(Candle {
        open_time: fields[0].as_i64()?,
        open: parse_number(&fields[1])?,
        high: parse_number(&fields[2])?,
        low: parse_number(&fields[3])?,
        close: parse_number(&fields[4])?,
        volume: parse_number(&fields[5])?,
        close_time: fields[6].as_i64()?,
        timeframe,
        trades: fields.get(8).and_then(Value::as_u64).unwrap_or(0),
    })
}
