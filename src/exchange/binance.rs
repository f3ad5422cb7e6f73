use super::{compact_symbol, parse_f64, ExchangeError, MarketDataSource};
use crate::models::{Candle, OrderBook, PublicTrade, Ticker, TradeDirection};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Public REST client for Binance spot market data.
/// Used as a consensus price source, so this client stays single-shot:
/// a failed call just drops Binance from the current validation pass.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Ticker24h {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
    #[serde(rename = "quoteVolume")]
    quote_volume: String,
    #[serde(rename = "closeTime")]
    close_time: i64,
}

#[derive(Debug, Deserialize)]
struct Depth {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct RecentTrade {
    price: String,
    qty: String,
    #[serde(rename = "isBuyerMaker")]
    is_buyer_maker: bool,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Api {
                exchange: "binance",
                message: format!("status {status}"),
            });
        }
        Ok(response.json().await?)
    }

    fn to_ticker(row: &Ticker24h, symbol: &str) -> Result<Ticker, ExchangeError> {
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: parse_f64(&row.last_price, "lastPrice")?,
            bid: parse_f64(&row.bid_price, "bidPrice")?,
            ask: parse_f64(&row.ask_price, "askPrice")?,
            quote_volume: parse_f64(&row.quote_volume, "quoteVolume")?,
            timestamp: Utc
                .timestamp_millis_opt(row.close_time)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let path = format!("/api/v3/ticker/24hr?symbol={}", compact_symbol(symbol));
        let row: Ticker24h = self.get_json(&path).await?;
        Self::to_ticker(&row, symbol)
    }

    async fn fetch_tickers(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Ticker>, ExchangeError> {
        // Binance takes a JSON array of symbols in the query string
        let compact: Vec<String> = symbols.iter().map(|s| compact_symbol(s)).collect();
        let encoded = serde_json::to_string(&compact)
            .map_err(|e| ExchangeError::malformed(e.to_string()))?;
        let path = format!("/api/v3/ticker/24hr?symbols={encoded}");
        let rows: Vec<Ticker24h> = self.get_json(&path).await?;

        let wanted: HashMap<String, &String> = symbols
            .iter()
            .map(|s| (compact_symbol(s), s))
            .collect();

        let mut tickers = HashMap::new();
        for row in &rows {
            if let Some(symbol) = wanted.get(&row.symbol) {
                tickers.insert((*symbol).clone(), Self::to_ticker(row, symbol)?);
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
            "/api/v3/klines?symbol={}&interval={}&limit={}",
            compact_symbol(symbol),
            timeframe,
            limit
        );
        // Kline rows mix integers and strings, so go through Value
        let rows: Vec<Vec<Value>> = self.get_json(&path).await?;

        let field = |row: &[Value], idx: usize, name: &str| -> Result<f64, ExchangeError> {
            let raw = row
                .get(idx)
                .and_then(Value::as_str)
                .ok_or_else(|| ExchangeError::malformed(format!("kline {name}")))?;
            parse_f64(raw, name)
        };

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            let open_time = row
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| ExchangeError::malformed("kline open time"))?;
            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp: Utc
                    .timestamp_millis_opt(open_time)
                    .single()
                    .unwrap_or_else(Utc::now),
                open: field(row, 1, "open")?,
                high: field(row, 2, "high")?,
                low: field(row, 3, "low")?,
                close: field(row, 4, "close")?,
                volume: field(row, 5, "volume")?,
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
            "/api/v3/depth?symbol={}&limit={}",
            compact_symbol(symbol),
            depth
        );
        let book: Depth = self.get_json(&path).await?;

        let parse_side = |levels: &[[String; 2]]| -> Result<Vec<(f64, f64)>, ExchangeError> {
            levels
                .iter()
                .map(|l| Ok((parse_f64(&l[0], "price")?, parse_f64(&l[1], "qty")?)))
                .collect()
        };

        Ok(OrderBook {
            bids: parse_side(&book.bids)?,
            asks: parse_side(&book.asks)?,
        })
    }

    async fn fetch_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError> {
        let path = format!(
            "/api/v3/trades?symbol={}&limit={}",
            compact_symbol(symbol),
            limit
        );
        let rows: Vec<RecentTrade> = self.get_json(&path).await?;

        rows.iter()
            .map(|row| {
                Ok(PublicTrade {
                    price: parse_f64(&row.price, "price")?,
                    amount: parse_f64(&row.qty, "qty")?,
                    // Buyer-maker means the aggressor sold into the bid
                    direction: if row.is_buyer_maker {
                        TradeDirection::Sell
                    } else {
                        TradeDirection::Buy
                    },
                })
            })
            .collect()
    }
}
