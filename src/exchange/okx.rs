use super::{dashed_symbol, parse_f64, ExchangeError, MarketDataSource};
use crate::models::{Candle, OrderBook, PublicTrade, Ticker, TradeDirection};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

const OKX_API_BASE: &str = "https://www.okx.com";

/// Public REST client for OKX spot market data (consensus source)
#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
    #[serde(rename = "bidPx")]
    bid_px: String,
    #[serde(rename = "askPx")]
    ask_px: String,
    #[serde(rename = "volCcy24h")]
    vol_ccy_24h: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct BookRow {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    px: String,
    sz: String,
    side: String,
}

impl OkxClient {
    pub fn new() -> Self {
        Self::with_base_url(OKX_API_BASE)
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

    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<Vec<T>, ExchangeError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Api {
                exchange: "okx",
                message: format!("status {status}"),
            });
        }
        let envelope: Envelope<T> = response.json().await?;
        if envelope.code != "0" {
            return Err(ExchangeError::Api {
                exchange: "okx",
                message: envelope.msg,
            });
        }
        Ok(envelope.data)
    }

    fn to_ticker(row: &TickerRow, symbol: &str) -> Result<Ticker, ExchangeError> {
        let ts_ms: i64 = row
            .ts
            .parse()
            .map_err(|_| ExchangeError::malformed("ticker ts"))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: parse_f64(&row.last, "last")?,
            bid: parse_f64(&row.bid_px, "bidPx")?,
            ask: parse_f64(&row.ask_px, "askPx")?,
            quote_volume: parse_f64(&row.vol_ccy_24h, "volCcy24h")?,
            timestamp: Utc
                .timestamp_millis_opt(ts_ms)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    fn bar_code(timeframe: &str) -> &'static str {
        match timeframe {
            "1m" => "1m",
            "5m" => "5m",
            "15m" => "15m",
            "4h" => "4H",
            "1d" => "1D",
            _ => "1H",
        }
    }
}

impl Default for OkxClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for OkxClient {
    fn name(&self) -> &'static str {
        "okx"
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let path = format!("/api/v5/market/ticker?instId={}", dashed_symbol(symbol));
        let rows: Vec<TickerRow> = self.get_data(&path).await?;
        let row = rows
            .first()
            .ok_or_else(|| ExchangeError::NoData(symbol.to_string()))?;
        Self::to_ticker(row, symbol)
    }

    async fn fetch_tickers(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Ticker>, ExchangeError> {
        let rows: Vec<TickerRow> = self
            .get_data("/api/v5/market/tickers?instType=SPOT")
            .await?;

        let wanted: HashMap<String, &String> = symbols
            .iter()
            .map(|s| (dashed_symbol(s), s))
            .collect();

        let mut tickers = HashMap::new();
        for row in &rows {
            if let Some(symbol) = wanted.get(&row.inst_id) {
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
            "/api/v5/market/candles?instId={}&bar={}&limit={}",
            dashed_symbol(symbol),
            Self::bar_code(timeframe),
            limit
        );
        // Rows are [ts, open, high, low, close, vol, volCcy, ...], newest first
        let rows: Vec<Vec<String>> = self.get_data(&path).await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            if row.len() < 6 {
                return Err(ExchangeError::malformed("short candle row"));
            }
            let ts_ms: i64 = row[0]
                .parse()
                .map_err(|_| ExchangeError::malformed("candle ts"))?;
            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp: Utc
                    .timestamp_millis_opt(ts_ms)
                    .single()
                    .unwrap_or_else(Utc::now),
                open: parse_f64(&row[1], "open")?,
                high: parse_f64(&row[2], "high")?,
                low: parse_f64(&row[3], "low")?,
                close: parse_f64(&row[4], "close")?,
                volume: parse_f64(&row[5], "vol")?,
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
            "/api/v5/market/books?instId={}&sz={}",
            dashed_symbol(symbol),
            depth
        );
        let rows: Vec<BookRow> = self.get_data(&path).await?;
        let book = rows
            .first()
            .ok_or_else(|| ExchangeError::NoData(symbol.to_string()))?;

        // OKX levels carry extra order-count columns; only price and size matter
        let parse_side = |levels: &[Vec<String>]| -> Result<Vec<(f64, f64)>, ExchangeError> {
            levels
                .iter()
                .map(|l| {
                    if l.len() < 2 {
                        return Err(ExchangeError::malformed("short book level"));
                    }
                    Ok((parse_f64(&l[0], "px")?, parse_f64(&l[1], "sz")?))
                })
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
            "/api/v5/market/trades?instId={}&limit={}",
            dashed_symbol(symbol),
            limit
        );
        let rows: Vec<TradeRow> = self.get_data(&path).await?;

        rows.iter()
            .map(|row| {
                Ok(PublicTrade {
                    price: parse_f64(&row.px, "px")?,
                    amount: parse_f64(&row.sz, "sz")?,
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
