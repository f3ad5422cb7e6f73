use crate::exchange::MarketDataSource;
use crate::models::TradeIdea;
use crate::strategy::SignalStrategy;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Walks the configured watchlist once per cycle, runs the strategy on
/// fresh candles, and returns whatever ideas came out. Per-symbol failures
/// are logged and skipped so one flaky symbol never kills a cycle.
pub struct SignalScanner {
    market: Arc<dyn MarketDataSource>,
    strategy: Box<dyn SignalStrategy>,
    symbols: Vec<String>,
    timeframe: String,
    symbol_delay: Duration,
}

impl SignalScanner {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        strategy: Box<dyn SignalStrategy>,
        symbols: Vec<String>,
        symbol_delay: Duration,
    ) -> Self {
        Self {
            market,
            strategy,
            symbols: normalize(symbols),
            timeframe: "1h".to_string(),
            symbol_delay,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Replace the watchlist. Returns false when the normalized list is
    /// identical to the current one, so callers can skip a redundant log.
    pub fn update_symbols(&mut self, symbols: Vec<String>) -> bool {
        let normalized = normalize(symbols);
        if normalized == self.symbols {
            return false;
        }
        info!(count = normalized.len(), "watchlist updated");
        self.symbols = normalized;
        true
    }

    /// One scan pass. Symbols in `open_symbols` already carry an open idea
    /// and are skipped before any network call.
    pub async fn scan(&self, open_symbols: &HashSet<String>) -> Vec<TradeIdea> {
        let mut ideas = Vec::new();

        for symbol in &self.symbols {
            if open_symbols.contains(symbol) {
                debug!(symbol, "idea already open, skipping");
                continue;
            }

            if let Some(floor) = self.strategy.min_quote_volume() {
                match self.market.fetch_ticker(symbol).await {
                    Ok(ticker) if ticker.quote_volume < floor => {
                        debug!(symbol, volume = ticker.quote_volume, "below volume floor");
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(symbol, error = %e, "ticker fetch failed, skipping");
                        continue;
                    }
                }
            }

            let candles = match self
                .market
                .fetch_ohlcv(symbol, &self.timeframe, self.strategy.candle_limit())
                .await
            {
                Ok(candles) => candles,
                Err(e) => {
                    warn!(symbol, error = %e, "candle fetch failed, skipping");
                    continue;
                }
            };

            if let Some(idea) = self.strategy.evaluate(symbol, &candles) {
                info!(
                    symbol,
                    side = idea.side.as_str(),
                    entry = idea.entry,
                    "signal generated"
                );
                ideas.push(idea);
            }

            if !self.symbol_delay.is_zero() {
                tokio::time::sleep(self.symbol_delay).await;
            }
        }

        ideas
    }
}

/// Trim, uppercase, drop empties, dedupe keeping first occurrence
fn normalize(symbols: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
