// Exchange connectivity: one client per venue behind a common trait.
// Every failure collapses into ExchangeError; callers treat any error as
// "skip this symbol this cycle".

pub mod binance;
pub mod bybit;
pub mod okx;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use okx::OkxClient;

use crate::models::{Candle, OrderBook, PublicTrade, Ticker};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{exchange} api error: {message}")]
    Api {
        exchange: &'static str,
        message: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no data for {0}")]
    NoData(String),
}

impl ExchangeError {
    pub fn malformed(context: impl Into<String>) -> Self {
        Self::Malformed(context.into())
    }
}

/// A market data venue. Calls return the freshest known values or fail;
/// there is no caching guarantee and rate limiting is the client's problem.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// Batched ticker fetch; symbols missing from the venue are simply
    /// absent from the returned map.
    async fn fetch_tickers(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Ticker>, ExchangeError>;

    /// Candles in chronological order, oldest first
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn fetch_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError>;

    async fn fetch_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError>;
}

/// "BTC/USDT" -> "BTCUSDT"
pub(crate) fn compact_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

/// "BTC/USDT" -> "BTC-USDT"
pub(crate) fn dashed_symbol(symbol: &str) -> String {
    symbol.replace('/', "-")
}

pub(crate) fn parse_f64(raw: &str, field: &str) -> Result<f64, ExchangeError> {
    raw.parse::<f64>()
        .map_err(|_| ExchangeError::malformed(format!("{field}: {raw:?}")))
}
