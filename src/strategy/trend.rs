use super::{IndicatorSnapshot, SignalStrategy};
use crate::models::{Candle, Side, TradeIdea};
use tracing::debug;

const SWING_LOOKBACK: usize = 5;
const ATR_STOP_MULT: f64 = 1.5;

/// Trend-following rule: trade only with the 200-period EMA, wait for a
/// pullback, enter on the close reclaiming EMA20. Stops come from recent
/// swing structure or an ATR buffer, whichever is wider; targets ladder
/// out at 1R/2R/3R.
pub struct TrendStrategy {
    pub rsi_long_band: (f64, f64),
    pub rsi_short_band: (f64, f64),
    pub min_quote_volume: f64,
}

impl Default for TrendStrategy {
    fn default() -> Self {
        Self {
            rsi_long_band: (45.0, 65.0),
            rsi_short_band: (35.0, 55.0),
            min_quote_volume: 1_000_000.0,
        }
    }
}

impl TrendStrategy {
    fn swing_low(candles: &[Candle]) -> f64 {
        candles
            .iter()
            .rev()
            .take(SWING_LOOKBACK)
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min)
    }

    fn swing_high(candles: &[Candle]) -> f64 {
        candles
            .iter()
            .rev()
            .take(SWING_LOOKBACK)
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

impl SignalStrategy for TrendStrategy {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn min_candles(&self) -> usize {
        201
    }

    fn candle_limit(&self) -> usize {
        250
    }

    fn min_quote_volume(&self) -> Option<f64> {
        Some(self.min_quote_volume)
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeIdea> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let snap = IndicatorSnapshot::compute(candles)?;
        let ema_trend = snap.ema_trend?;
        let atr = snap.atr?;
        let entry = snap.close;

        let long = entry > ema_trend
            && self.rsi_long_band.0 < snap.rsi
            && snap.rsi < self.rsi_long_band.1
            && snap.ema_fast > snap.ema_slow
            && snap.crossed_up();

        let short = entry < ema_trend
            && self.rsi_short_band.0 < snap.rsi
            && snap.rsi < self.rsi_short_band.1
            && snap.ema_fast < snap.ema_slow
            && snap.crossed_down();

        let (side, stop) = if long {
            (
                Side::Long,
                Self::swing_low(candles).min(entry - ATR_STOP_MULT * atr),
            )
        } else if short {
            (
                Side::Short,
                Self::swing_high(candles).max(entry + ATR_STOP_MULT * atr),
            )
        } else {
            return None;
        };

        let risk = (entry - stop).abs();
        if risk <= 0.0 {
            debug!(symbol, "degenerate stop distance, skipping");
            return None;
        }

        let targets = match side {
            Side::Long => vec![entry + risk, entry + 2.0 * risk, entry + 3.0 * risk],
            Side::Short => vec![entry - risk, entry - 2.0 * risk, entry - 3.0 * risk],
        };

        let rationale = format!(
            "EMA20 reclaim with trend, RSI {:.1}, risk {:.4}",
            snap.rsi, risk
        );
        Some(TradeIdea::new(symbol, side, entry, stop, targets, rationale))
    }
}
