use super::{compact_symbol, parse_f64, ExchangeError, MarketDataSource};
use crate::models::{Candle, OrderBook, PublicTrade, Ticker, TradeDirection};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const BYBIT_API_BASE: &str = "https://api.bybit.com";
const RATE_LIMIT_RPS: u32 = 10;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Public REST client for Bybit spot market data
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<T>,
    #[serde(default)]
    time: i64,
}

#[derive(Debug, Deserialize)]
struct TickerList {
    list: Vec<TickerRow>,
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bid1Price")]
    bid_price: String,
    #[serde(rename = "ask1Price")]
    ask_price: String,
    #[serde(rename = "turnover24h")]
    turnover_24h: String,
}

#[derive(Debug, Deserialize)]
struct KlineList {
    // Rows are [start_ms, open, high, low, close, volume, turnover], newest first
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BookResult {
    b: Vec<[String; 2]>,
    a: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct TradeList {
    list: Vec<TradeRow>,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    price: String,
    size: String,
    side: String,
}

impl BybitClient {
    pub fn new() -> Self {
        Self::with_base_url(BYBIT_API_BASE)
    }

    /// Point the client at a different host (used by tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap());
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Rate-limited GET with retry on transient failures
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<Envelope<T>, ExchangeError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let mut last_error: Option<ExchangeError> = None;

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope: Envelope<T> = response.json().await?;
                        if envelope.ret_code != 0 {
                            return Err(ExchangeError::Api {
                                exchange: "bybit",
                                message: envelope.ret_msg,
                            });
                        }
                        return Ok(envelope);
                    }
                    // 429 and 5xx are worth retrying, anything else is not
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(ExchangeError::Api {
                            exchange: "bybit",
                            message: format!("unexpected status {status}"),
                        });
                    }
                    last_error = Some(ExchangeError::Api {
                        exchange: "bybit",
                        message: format!("status {status}"),
                    });
                }
                Err(e) => last_error = Some(e.into()),
            }

            if attempt < MAX_RETRIES {
                let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                tracing::warn!(
                    "Bybit request failed (attempt {}/{}), retrying in {}ms",
                    attempt,
                    MAX_RETRIES,
                    backoff_ms
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| ExchangeError::malformed("all retry attempts failed")))
    }

    fn row_to_ticker(row: &TickerRow, symbol: &str, ts_ms: i64) -> Result<Ticker, ExchangeError> {
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: parse_f64(&row.last_price, "lastPrice")?,
            bid: parse_f64(&row.bid_price, "bid1Price")?,
            ask: parse_f64(&row.ask_price, "ask1Price")?,
            quote_volume: parse_f64(&row.turnover_24h, "turnover24h")?,
            timestamp: Utc
                .timestamp_millis_opt(ts_ms)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    fn interval_code(timeframe: &str) -> &'static str {
        match timeframe {
            "1m" => "1",
            "5m" => "5",
            "15m" => "15",
            "4h" => "240",
            "1d" => "D",
            // The signal pipeline runs on hourly candles
            _ => "60",
        }
    }
}

impl Default for BybitClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for BybitClient {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let path = format!(
            "/v5/market/tickers?category=spot&symbol={}",
            compact_symbol(symbol)
        );
        let envelope: Envelope<TickerList> = self.get_json(&path).await?;
        let result = envelope
            .result
            .ok_or_else(|| ExchangeError::malformed("missing result"))?;
        let row = result
            .list
            .first()
            .ok_or_else(|| ExchangeError::NoData(symbol.to_string()))?;
        Self::row_to_ticker(row, symbol, envelope.time)
    }

    async fn fetch_tickers(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Ticker>, ExchangeError> {
        // One call for the whole spot universe, filtered down to what we track
        let envelope: Envelope<TickerList> =
            self.get_json("/v5/market/tickers?category=spot").await?;
        let result = envelope
            .result
            .ok_or_else(|| ExchangeError::malformed("missing result"))?;

        let wanted: HashMap<String, &String> = symbols
            .iter()
            .map(|s| (compact_symbol(s), s))
            .collect();

        let mut tickers = HashMap::new();
        for row in &result.list {
            if let Some(symbol) = wanted.get(&row.symbol) {
                let ticker = Self::row_to_ticker(row, symbol, envelope.time)?;
                tickers.insert((*symbol).clone(), ticker);
            }
        }
        Ok(tickers)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let path = format!(
            "/v5/market/kline?category=spot&symbol={}&interval={}&limit={}",
            compact_symbol(symbol),
            Self::interval_code(timeframe),
            limit
        );
        let envelope: Envelope<KlineList> = self.get_json(&path).await?;
        let result = envelope
            .result
            .ok_or_else(|| ExchangeError::malformed("missing result"))?;

        let mut candles = Vec::with_capacity(result.list.len());
        // Bybit returns newest first; iterate in reverse for chronological order
        for row in result.list.iter().rev() {
            if row.len() < 6 {
                return Err(ExchangeError::malformed("short kline row"));
            }
            let start_ms: i64 = row[0]
                .parse()
                .map_err(|_| ExchangeError::malformed("kline start time"))?;
            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp: Utc
                    .timestamp_millis_opt(start_ms)
                    .single()
                    .unwrap_or_else(Utc::now),
                open: parse_f64(&row[1], "open")?,
                high: parse_f64(&row[2], "high")?,
                low: parse_f64(&row[3], "low")?,
                close: parse_f64(&row[4], "close")?,
                volume: parse_f64(&row[5], "volume")?,
            });
        }
        Ok(candles)
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        let path = format!(
            "/v5/market/orderbook?category=spot&symbol={}&limit={}",
            compact_symbol(symbol),
            depth
        );
        let envelope: Envelope<BookResult> = self.get_json(&path).await?;
        let result = envelope
            .result
            .ok_or_else(|| ExchangeError::malformed("missing result"))?;

        let parse_side = |levels: &[[String; 2]]| -> Result<Vec<(f64, f64)>, ExchangeError> {
            levels
                .iter()
                .map(|l| Ok((parse_f64(&l[0], "price")?, parse_f64(&l[1], "size")?)))
                .collect()
        };

        Ok(OrderBook {
            bids: parse_side(&result.b)?,
            asks: parse_side(&result.a)?,
        })
    }

    async fn fetch_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError> {
        let path = format!(
            "/v5/market/recent-trade?category=spot&symbol={}&limit={}",
            compact_symbol(symbol),
            limit
        );
        let envelope: Envelope<TradeList> = self.get_json(&path).await?;
        let result = envelope
            .result
            .ok_or_else(|| ExchangeError::malformed("missing result"))?;

        result
            .list
            .iter()
            .map(|row| {
                Ok(PublicTrade {
                    price: parse_f64(&row.price, "price")?,
                    amount: parse_f64(&row.size, "size")?,
                    direction: if row.side.eq_ignore_ascii_case("buy") {
                        TradeDirection::Buy
                    } else {
                        TradeDirection::Sell
                    },
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker_body() -> &'static str {
        r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "spot",
                "list": [{
                    "symbol": "BTCUSDT",
                    "lastPrice": "65000.5",
                    "bid1Price": "65000.0",
                    "ask1Price": "65001.0",
                    "turnover24h": "2500000000"
                }]
            },
            "time": 1700000000000
        }"#
    }

    #[tokio::test]
    async fn test_fetch_ticker() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v5/market/tickers")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(ticker_body())
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let ticker = client.fetch_ticker("BTC/USDT").await.unwrap();

        assert_eq!(ticker.symbol, "BTC/USDT");
        assert_eq!(ticker.last, 65000.5);
        assert_eq!(ticker.quote_volume, 2_500_000_000.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_ohlcv_is_chronological() {
        let mut server = mockito::Server::new_async().await;
        // Bybit serves newest first
        let body = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "list": [
                    ["1700007200000", "102", "103", "101", "102.5", "10", "1025"],
                    ["1700003600000", "101", "102", "100", "102", "12", "1212"],
                    ["1700000000000", "100", "101", "99", "101", "15", "1515"]
                ]
            },
            "time": 1700007300000
        }"#;
        let _mock = server
            .mock("GET", "/v5/market/kline")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let candles = client.fetch_ohlcv("BTC/USDT", "1h", 3).await.unwrap();

        assert_eq!(candles.len(), 3);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert!(candles[1].timestamp < candles[2].timestamp);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[2].close, 102.5);
    }

    #[tokio::test]
    async fn test_api_error_code_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v5/market/tickers")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"retCode": 10001, "retMsg": "params error", "result": null, "time": 0}"#)
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let err = client.fetch_ticker("BTC/USDT").await.unwrap_err();
        assert!(err.to_string().contains("params error"));
    }

    #[tokio::test]
    async fn test_fetch_tickers_filters_to_requested() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "list": [
                    {"symbol": "BTCUSDT", "lastPrice": "65000", "bid1Price": "64999", "ask1Price": "65001", "turnover24h": "1"},
                    {"symbol": "ETHUSDT", "lastPrice": "3500", "bid1Price": "3499", "ask1Price": "3501", "turnover24h": "1"},
                    {"symbol": "DOGEUSDT", "lastPrice": "0.1", "bid1Price": "0.09", "ask1Price": "0.11", "turnover24h": "1"}
                ]
            },
            "time": 1700000000000
        }"#;
        let _mock = server
            .mock("GET", "/v5/market/tickers")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let symbols = vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()];
        let tickers = client.fetch_tickers(&symbols).await.unwrap();

        assert_eq!(tickers.len(), 2);
        assert!(tickers.contains_key("BTC/USDT"));
        assert!(tickers.contains_key("ETH/USDT"));
    }
}
