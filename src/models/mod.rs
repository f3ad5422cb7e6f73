use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a trade idea
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

/// Lifecycle of a trade idea. Starts Open, becomes terminal exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IdeaStatus {
    Open,
    ClosedWin,
    ClosedLoss,
}

/// A proposed trade: entry, stop and one or more targets
///
/// At most one open idea per symbol may exist in the tracker's working set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIdea {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry: f64,
    pub stop: f64,
    /// Ordered targets; the first one closes the idea as a win
    pub targets: Vec<f64>,
    pub rationale: String,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
}

impl TradeIdea {
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        entry: f64,
        stop: f64,
        targets: Vec<f64>,
        rationale: impl Into<String>,
    ) -> Self {
        debug_assert!(!targets.is_empty(), "an idea needs at least one target");
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            entry,
            stop,
            targets,
            rationale: rationale.into(),
            status: IdeaStatus::Open,
            created_at: Utc::now(),
        }
    }

    /// First (closest) take-profit level, if any target is set.
    /// `targets` is a public field, so an empty ladder is representable.
    pub fn first_target(&self) -> Option<f64> {
        self.targets.first().copied()
    }

    /// Realized move in percent for a given exit price.
    /// Positive means the trade went in the idea's favor.
    pub fn realized_pct(&self, exit_price: f64) -> f64 {
        let raw = (exit_price - self.entry) / self.entry * 100.0;
        match self.side {
            Side::Long => raw,
            Side::Short => -raw,
        }
    }

    /// Distance from entry to stop as a fraction of entry
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop).abs() / self.entry
    }

    /// Reward-to-risk ratio against the first target
    pub fn risk_reward(&self) -> f64 {
        let risk = (self.entry - self.stop).abs();
        let Some(first) = self.first_target() else {
            return 0.0;
        };
        if risk <= 0.0 {
            return 0.0;
        }
        (first - self.entry).abs() / risk
    }
}

/// OHLCV candlestick for a symbol, fixed timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Freshest known exchange quote for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub quote_volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Bid/ask spread as a percentage of the last price
    pub fn spread_pct(&self) -> f64 {
        if self.last <= 0.0 {
            return 0.0;
        }
        (self.ask - self.bid) / self.last * 100.0
    }
}

/// Price levels of one side of the book: (price, amount)
pub type BookLevel = (f64, f64);

/// Top of an exchange order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn mid_price(&self) -> Option<f64> {
        let best_bid = self.bids.first()?.0;
        let best_ask = self.asks.first()?.0;
        Some((best_bid + best_ask) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// A recent public trade, used for buy/sell flow analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTrade {
    pub price: f64,
    pub amount: f64,
    pub direction: TradeDirection,
}

/// A paying recipient of signal broadcasts
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub user_id: i64,
    pub username: Option<String>,
    pub status: String,
    pub subscribed_until: Option<DateTime<Utc>>,
    /// Comma-separated symbol list, e.g. "BTC/USDT,ETH/USDT"
    pub selected_pairs: String,
    pub deposit: f64,
    pub risk_per_trade: f64,
}

impl Subscriber {
    /// Whether this subscriber opted into the given symbol
    pub fn wants(&self, symbol: &str) -> bool {
        self.selected_pairs
            .split(',')
            .any(|p| p.trim().eq_ignore_ascii_case(symbol))
    }
}
