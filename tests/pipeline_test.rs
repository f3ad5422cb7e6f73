//! End-to-end flow over a fake market: scan produces an idea, the tracker
//! accepts it, a later price print closes it.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use cryptopulse::exchange::{ExchangeError, MarketDataSource};
use cryptopulse::generator::SignalScanner;
use cryptopulse::models::{Candle, IdeaStatus, OrderBook, PublicTrade, Side, Subscriber, Ticker};
use cryptopulse::notifier::{Broadcaster, Notifier};
use cryptopulse::quality::{rate_idea, QualityLevel};
use cryptopulse::strategy::CrossoverStrategy;
use cryptopulse::tracker::{AcceptOutcome, SignalTracker};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Scriptable venue: fixed candle history, mutable last prices
struct FakeMarket {
    candles: HashMap<String, Vec<Candle>>,
    prices: Mutex<HashMap<String, f64>>,
}

impl FakeMarket {
    fn new() -> Self {
        Self {
            candles: HashMap::new(),
            prices: Mutex::new(HashMap::new()),
        }
    }

    fn with_candles(mut self, symbol: &str, closes: &[f64]) -> Self {
        let start = Utc::now() - ChronoDuration::hours(closes.len() as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: symbol.to_string(),
                timestamp: start + ChronoDuration::hours(i as i64),
                open: close,
                high: close * 1.002,
                low: close * 0.998,
                close,
                volume: 1000.0,
            })
            .collect();
        self.candles.insert(symbol.to_string(), candles);
        self
    }

    fn set_price(&self, symbol: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    fn ticker(symbol: &str, price: f64) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            last: price,
            bid: price * 0.9995,
            ask: price * 1.0005,
            quote_volume: 5_000_000.0,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::NoData(symbol.to_string()))?;
        Ok(Self::ticker(symbol, price))
    }

    async fn fetch_tickers(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Ticker>, ExchangeError> {
        let prices = self.prices.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), Self::ticker(s, *p))))
            .collect())
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.candles
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::NoData(symbol.to_string()))
    }

    async fn fetch_order_book(
        &self,
        symbol: &str,
        _depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        Err(ExchangeError::NoData(symbol.to_string()))
    }

    async fn fetch_trades(
        &self,
        symbol: &str,
        _limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError> {
        Err(ExchangeError::NoData(symbol.to_string()))
    }
}

/// Close series that satisfies the long crossover setup at the last bar
fn long_setup_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..61).map(|i| 100.0 + 0.5 * i as f64).collect();
    closes.extend((0..10).map(|i| 130.0 - 1.5 * (i + 1) as f64));
    closes.push(115.75);
    closes
}

#[tokio::test]
async fn test_signal_flows_from_scan_to_close() {
    let market = Arc::new(FakeMarket::new().with_candles("BTC/USDT", &long_setup_closes()));
    market.set_price("BTC/USDT", 115.75);

    let scanner = SignalScanner::new(
        market.clone(),
        Box::new(CrossoverStrategy::default()),
        vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
        Duration::ZERO,
    );

    // ETH has no candles and must not break the pass
    let ideas = scanner.scan(&HashSet::new()).await;
    assert_eq!(ideas.len(), 1);
    let idea = &ideas[0];
    assert_eq!(idea.symbol, "BTC/USDT");
    assert_eq!(idea.side, Side::Long);

    let rating = rate_idea(idea, None);
    assert_ne!(rating.level, QualityLevel::Weak);

    let mut tracker = SignalTracker::new(market.clone(), None);
    assert_eq!(
        tracker.accept(idea.clone()).await.unwrap(),
        AcceptOutcome::Accepted
    );

    // Price drifts but hits nothing yet
    market.set_price("BTC/USDT", 116.5);
    assert!(tracker.poll().await.unwrap().is_empty());
    assert_eq!(tracker.open_count(), 1);

    // Target is entry * 1.03
    market.set_price("BTC/USDT", 115.75 * 1.031);
    let closed = tracker.poll().await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].outcome, IdeaStatus::ClosedWin);
    assert!(closed[0].realized_pct > 3.0);
    assert_eq!(tracker.open_count(), 0);
}

#[tokio::test]
async fn test_open_symbol_not_rescanned() {
    let market = Arc::new(FakeMarket::new().with_candles("BTC/USDT", &long_setup_closes()));
    market.set_price("BTC/USDT", 115.75);

    let scanner = SignalScanner::new(
        market.clone(),
        Box::new(CrossoverStrategy::default()),
        vec!["BTC/USDT".to_string()],
        Duration::ZERO,
    );

    let mut tracker = SignalTracker::new(market.clone(), None);
    let ideas = scanner.scan(&HashSet::new()).await;
    tracker.accept(ideas[0].clone()).await.unwrap();

    // With the idea open the scanner skips the symbol entirely
    let ideas = scanner.scan(&tracker.open_symbols()).await;
    assert!(ideas.is_empty());
}

/// Records every delivered recipient
struct RecordingNotifier {
    sent_to: Mutex<Vec<i64>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: i64, _text: &str) -> cryptopulse::Result<()> {
        self.sent_to.lock().unwrap().push(recipient);
        Ok(())
    }
}

#[tokio::test]
async fn test_close_broadcast_runs_with_tracker_unlocked() {
    let market = Arc::new(FakeMarket::new().with_candles("BTC/USDT", &long_setup_closes()));
    market.set_price("BTC/USDT", 115.75);

    let scanner = SignalScanner::new(
        market.clone(),
        Box::new(CrossoverStrategy::default()),
        vec!["BTC/USDT".to_string()],
        Duration::ZERO,
    );
    let ideas = scanner.scan(&HashSet::new()).await;

    let tracker = Arc::new(AsyncMutex::new(SignalTracker::new(market.clone(), None)));
    tracker.lock().await.accept(ideas[0].clone()).await.unwrap();

    market.set_price("BTC/USDT", 115.75 * 1.031);
    let closed = {
        let mut guard = tracker.lock().await;
        guard.poll().await.unwrap()
    };
    assert_eq!(closed.len(), 1);

    // Closes carry everything delivery needs, so the tracker stays free
    // for the scan loop while messages go out
    let _relock = tracker.try_lock().expect("tracker free during fan-out");

    let recorder = Arc::new(RecordingNotifier {
        sent_to: Mutex::new(Vec::new()),
    });
    let broadcaster = Broadcaster::new(recorder.clone());
    let subscribers = vec![Subscriber {
        user_id: 7,
        username: None,
        status: "PREMIUM".to_string(),
        subscribed_until: None,
        selected_pairs: "BTC/USDT".to_string(),
        deposit: 1000.0,
        risk_per_trade: 1.0,
    }];

    let sent = broadcaster.broadcast_close(&closed[0], &subscribers).await;
    assert_eq!(sent, 1);
    assert_eq!(*recorder.sent_to.lock().unwrap(), vec![7]);
}

#[tokio::test]
async fn test_stop_out_closes_as_loss() {
    let market = Arc::new(FakeMarket::new().with_candles("BTC/USDT", &long_setup_closes()));
    market.set_price("BTC/USDT", 115.75);

    let scanner = SignalScanner::new(
        market.clone(),
        Box::new(CrossoverStrategy::default()),
        vec!["BTC/USDT".to_string()],
        Duration::ZERO,
    );
    let ideas = scanner.scan(&HashSet::new()).await;
    let stop = ideas[0].stop;

    let mut tracker = SignalTracker::new(market.clone(), None);
    tracker.accept(ideas[0].clone()).await.unwrap();

    market.set_price("BTC/USDT", stop * 0.999);
    let closed = tracker.poll().await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].outcome, IdeaStatus::ClosedLoss);
    assert!(closed[0].realized_pct < 0.0);
}
