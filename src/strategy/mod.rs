// Entry-rule strategies. Two deliberately separate variants live here:
// the plain crossover rule and the trend-confirmed ATR rule. They share
// the TradeIdea shape (ordered targets) so the tracker treats both the same.

pub mod crossover;
pub mod trend;

pub use crossover::CrossoverStrategy;
pub use trend::TrendStrategy;

use crate::indicators::{calculate_atr, calculate_ema, calculate_rsi};
use crate::models::{Candle, TradeIdea};

pub const RSI_PERIOD: usize = 14;
pub const EMA_FAST: usize = 20;
pub const EMA_SLOW: usize = 50;
pub const EMA_TREND: usize = 200;
pub const ATR_PERIOD: usize = 14;

/// A rule that turns a candle series into at most one trade idea.
/// Short series and indicator gaps mean "no signal", never an error.
pub trait SignalStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Below this many candles the rule does not even evaluate
    fn min_candles(&self) -> usize;

    /// How many candles the scanner should request per symbol
    fn candle_limit(&self) -> usize;

    /// 24h quote-volume floor; symbols under it are skipped before any
    /// candle fetch. None disables the gate.
    fn min_quote_volume(&self) -> Option<f64> {
        None
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeIdea>;
}

/// Indicator values for the last bar and the one before it.
/// Derived per evaluation and thrown away, never persisted.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub prev_close: f64,
    pub rsi: f64,
    pub prev_rsi: f64,
    pub ema_fast: f64,
    pub prev_ema_fast: f64,
    pub ema_slow: f64,
    pub prev_ema_slow: f64,
    /// Only present with enough history for the 200-period average
    pub ema_trend: Option<f64>,
    pub atr: Option<f64>,
}

impl IndicatorSnapshot {
    /// Compute the snapshot, or None when the base indicators cannot be
    /// formed from the available history.
    pub fn compute(candles: &[Candle]) -> Option<Self> {
        if candles.len() < 2 {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let n = closes.len();
        let prev = &closes[..n - 1];

        Some(Self {
            close: closes[n - 1],
            prev_close: closes[n - 2],
            rsi: calculate_rsi(&closes, RSI_PERIOD)?,
            prev_rsi: calculate_rsi(prev, RSI_PERIOD)?,
            ema_fast: calculate_ema(&closes, EMA_FAST)?,
            prev_ema_fast: calculate_ema(prev, EMA_FAST)?,
            ema_slow: calculate_ema(&closes, EMA_SLOW)?,
            prev_ema_slow: calculate_ema(prev, EMA_SLOW)?,
            ema_trend: calculate_ema(&closes, EMA_TREND),
            atr: calculate_atr(candles, ATR_PERIOD),
        })
    }

    /// Close crossed above the fast EMA on the latest bar
    pub fn crossed_up(&self) -> bool {
        self.prev_close <= self.prev_ema_fast && self.close > self.ema_fast
    }

    /// Close crossed below the fast EMA on the latest bar
    pub fn crossed_down(&self) -> bool {
        self.prev_close >= self.prev_ema_fast && self.close < self.ema_fast
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::models::Candle;
    use chrono::{Duration, Utc};

    /// Hourly candles from a close series; highs/lows hug the close
    pub fn hourly_candles(symbol: &str, closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: symbol.to_string(),
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close * 1.002,
                low: close * 0.998,
                close,
                volume: 1000.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testutil::hourly_candles;

    #[test]
    fn test_snapshot_requires_history() {
        let candles = hourly_candles("BTC/USDT", &[100.0, 101.0, 102.0]);
        assert!(IndicatorSnapshot::compute(&candles).is_none());
    }

    #[test]
    fn test_snapshot_trend_fields_optional() {
        // Enough for RSI/EMA20/EMA50 but not EMA200
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.1).collect();
        let candles = hourly_candles("BTC/USDT", &closes);

        let snap = IndicatorSnapshot::compute(&candles).unwrap();
        assert!(snap.ema_trend.is_none());
        assert!(snap.atr.is_some());
        assert!(snap.ema_fast > snap.ema_slow); // uptrend ordering
    }

    #[test]
    fn test_snapshot_full_history() {
        let closes: Vec<f64> = (0..210).map(|i| 100.0 + i as f64 * 0.1).collect();
        let candles = hourly_candles("BTC/USDT", &closes);

        let snap = IndicatorSnapshot::compute(&candles).unwrap();
        assert!(snap.ema_trend.is_some());
        assert!(snap.close > snap.ema_trend.unwrap());
    }
}
