// Cross-venue price agreement. Every venue is optional: whatever answers
// this cycle forms the consensus, and an empty answer set means "no
// opinion", never a hard failure.

use crate::exchange::MarketDataSource;
use crate::models::{OrderBook, PublicTrade, TradeDirection};
use std::sync::Arc;
use tracing::{debug, warn};

const DEPTH_BAND_PCT: f64 = 0.5;
const RELIABLE_DISCREPANCY_PCT: f64 = 2.0;
const VALID_DEVIATION_PCT: f64 = 1.0;
const BULLISH_RATIO: f64 = 0.6;
const BEARISH_RATIO: f64 = 0.4;
const BOOK_DEPTH: usize = 20;
const TRADE_SAMPLE: usize = 100;

/// Liquidity resting within ±0.5% of the mid price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSummary {
    pub bid_volume: f64,
    pub ask_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTrend {
    Bullish,
    Bearish,
    Neutral,
}

/// Taker buy/sell split over the recent trade tape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeFlow {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub buy_ratio: f64,
    pub trend: FlowTrend,
}

/// What one venue reported this cycle
#[derive(Debug, Clone)]
pub struct ExchangeReading {
    pub exchange: &'static str,
    pub price: f64,
    pub quote_volume: f64,
    pub spread_pct: Option<f64>,
    pub depth: Option<DepthSummary>,
    pub flow: Option<TradeFlow>,
}

#[derive(Debug, Clone)]
pub struct ConsensusReport {
    pub symbol: String,
    pub readings: Vec<ExchangeReading>,
    /// Volume-weighted consensus price
    pub weighted_price: f64,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Spread between the cheapest and dearest venue, percent of consensus
    pub max_discrepancy_pct: f64,
    pub most_liquid: &'static str,
    /// Venues agree within 2%
    pub reliable: bool,
}

/// Verdict on a proposed entry price. Advisory only; a missing consensus
/// never blocks a signal.
#[derive(Debug, Clone)]
pub struct PriceValidation {
    pub valid: bool,
    pub deviation_pct: Option<f64>,
    pub consensus_price: Option<f64>,
    pub sources: usize,
}

impl PriceValidation {
    fn no_data() -> Self {
        Self {
            valid: true,
            deviation_pct: None,
            consensus_price: None,
            sources: 0,
        }
    }
}

pub struct MultiExchangeMonitor {
    sources: Vec<Arc<dyn MarketDataSource>>,
}

impl MultiExchangeMonitor {
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>) -> Self {
        Self { sources }
    }

    /// Poll every venue for one symbol. None when nothing answered.
    pub async fn snapshot(&self, symbol: &str) -> Option<ConsensusReport> {
        let mut readings = Vec::new();

        for source in &self.sources {
            let ticker = match source.fetch_ticker(symbol).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(exchange = source.name(), symbol, error = %e, "venue unavailable");
                    continue;
                }
            };

            let depth = match source.fetch_order_book(symbol, BOOK_DEPTH).await {
                Ok(book) => summarize_depth(&book),
                Err(e) => {
                    debug!(exchange = source.name(), symbol, error = %e, "no order book");
                    None
                }
            };

            let flow = match source.fetch_trades(symbol, TRADE_SAMPLE).await {
                Ok(trades) => summarize_flow(&trades),
                Err(e) => {
                    debug!(exchange = source.name(), symbol, error = %e, "no trade tape");
                    None
                }
            };

            readings.push(ExchangeReading {
                exchange: source.name(),
                price: ticker.last,
                quote_volume: ticker.quote_volume,
                spread_pct: Some(ticker.spread_pct()),
                depth,
                flow,
            });
        }

        build_report(symbol, readings)
    }

    /// Compare a proposed entry against the cross-venue consensus
    pub async fn validate_price(&self, symbol: &str, proposed: f64) -> PriceValidation {
        let Some(report) = self.snapshot(symbol).await else {
            debug!(symbol, "no consensus data, passing validation");
            return PriceValidation::no_data();
        };

        let deviation_pct =
            ((proposed - report.weighted_price) / report.weighted_price).abs() * 100.0;
        PriceValidation {
            valid: deviation_pct < VALID_DEVIATION_PCT,
            deviation_pct: Some(deviation_pct),
            consensus_price: Some(report.weighted_price),
            sources: report.readings.len(),
        }
    }
}

fn build_report(symbol: &str, readings: Vec<ExchangeReading>) -> Option<ConsensusReport> {
    if readings.is_empty() {
        return None;
    }

    let total_volume: f64 = readings.iter().map(|r| r.quote_volume).sum();
    let weighted_price = if total_volume > 0.0 {
        readings
            .iter()
            .map(|r| r.price * r.quote_volume)
            .sum::<f64>()
            / total_volume
    } else {
        readings.iter().map(|r| r.price).sum::<f64>() / readings.len() as f64
    };
    let average_price = readings.iter().map(|r| r.price).sum::<f64>() / readings.len() as f64;

    let min_price = readings.iter().map(|r| r.price).fold(f64::INFINITY, f64::min);
    let max_price = readings
        .iter()
        .map(|r| r.price)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_discrepancy_pct = if weighted_price > 0.0 {
        (max_price - min_price) / weighted_price * 100.0
    } else {
        0.0
    };

    let most_liquid = readings
        .iter()
        .max_by(|a, b| a.quote_volume.total_cmp(&b.quote_volume))
        .map(|r| r.exchange)?;

    Some(ConsensusReport {
        symbol: symbol.to_string(),
        weighted_price,
        average_price,
        min_price,
        max_price,
        max_discrepancy_pct,
        most_liquid,
        reliable: max_discrepancy_pct < RELIABLE_DISCREPANCY_PCT,
        readings,
    })
}

fn summarize_depth(book: &OrderBook) -> Option<DepthSummary> {
    let mid = book.mid_price()?;
    let low = mid * (1.0 - DEPTH_BAND_PCT / 100.0);
    let high = mid * (1.0 + DEPTH_BAND_PCT / 100.0);

    let bid_volume = book
        .bids
        .iter()
        .filter(|(price, _)| *price >= low)
        .map(|(price, size)| price * size)
        .sum();
    let ask_volume = book
        .asks
        .iter()
        .filter(|(price, _)| *price <= high)
        .map(|(price, size)| price * size)
        .sum();

    Some(DepthSummary {
        bid_volume,
        ask_volume,
    })
}

fn summarize_flow(trades: &[PublicTrade]) -> Option<TradeFlow> {
    if trades.is_empty() {
        return None;
    }

    let mut buy_volume = 0.0;
    let mut sell_volume = 0.0;
    for trade in trades {
        let notional = trade.price * trade.amount;
        match trade.direction {
            TradeDirection::Buy => buy_volume += notional,
            TradeDirection::Sell => sell_volume += notional,
        }
    }

    let total = buy_volume + sell_volume;
    if total <= 0.0 {
        return None;
    }
    let buy_ratio = buy_volume / total;
    let trend = if buy_ratio > BULLISH_RATIO {
        FlowTrend::Bullish
    } else if buy_ratio < BEARISH_RATIO {
        FlowTrend::Bearish
    } else {
        FlowTrend::Neutral
    };

    Some(TradeFlow {
        buy_volume,
        sell_volume,
        buy_ratio,
        trend,
    })
}
