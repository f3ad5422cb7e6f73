use super::{IndicatorSnapshot, SignalStrategy};
use crate::models::{Candle, Side, TradeIdea};
use tracing::debug;

/// RSI band + EMA alignment rule with fixed percentage exits.
///
/// Long: RSI pulled back into the 10..40 band while EMA20 holds above
/// EMA50 and the previous close sat at or below EMA20. Short mirrors it
/// in the 60..90 band. One target, tight stop.
pub struct CrossoverStrategy {
    pub rsi_long_band: (f64, f64),
    pub rsi_short_band: (f64, f64),
    pub target_pct: f64,
    pub stop_pct: f64,
}

impl Default for CrossoverStrategy {
    fn default() -> Self {
        Self {
            rsi_long_band: (10.0, 40.0),
            rsi_short_band: (60.0, 90.0),
            target_pct: 0.03,
            stop_pct: 0.015,
        }
    }
}

impl SignalStrategy for CrossoverStrategy {
    fn name(&self) -> &'static str {
        "crossover"
    }

    fn min_candles(&self) -> usize {
        // EMA50 on the previous bar needs 51 closes
        51
    }

    fn candle_limit(&self) -> usize {
        100
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeIdea> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let snap = IndicatorSnapshot::compute(candles)?;
        let entry = snap.close;

        let long = self.rsi_long_band.0 < snap.rsi
            && snap.rsi < self.rsi_long_band.1
            && snap.ema_fast > snap.ema_slow
            && snap.prev_close <= snap.prev_ema_fast;

        let short = self.rsi_short_band.0 < snap.rsi
            && snap.rsi < self.rsi_short_band.1
            && snap.ema_fast < snap.ema_slow
            && snap.prev_close >= snap.prev_ema_fast;

        let (side, target, stop) = if long {
            (
                Side::Long,
                entry * (1.0 + self.target_pct),
                entry * (1.0 - self.stop_pct),
            )
        } else if short {
            (
                Side::Short,
                entry * (1.0 - self.target_pct),
                entry * (1.0 + self.stop_pct),
            )
        } else {
            debug!(symbol, rsi = snap.rsi, "no crossover setup");
            return None;
        };

        let rationale = format!(
            "RSI {:.1} in {} band with EMA20/EMA50 aligned",
            snap.rsi,
            side.as_str()
        );
        Some(TradeIdea::new(
            symbol, side, entry, stop, vec![target], rationale,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testutil::hourly_candles;

    fn long_setup_closes() -> Vec<f64> {
        // Slow climb, sharp pullback, small bounce. RSI lands ~27 with
        // EMA20 still above EMA50.
        let mut closes: Vec<f64> = (0..61).map(|i| 100.0 + 0.5 * i as f64).collect();
        closes.extend((0..10).map(|i| 130.0 - 1.5 * (i + 1) as f64));
        closes.push(115.75);
        closes
    }

    #[test]
    fn test_long_setup_fires() {
        let candles = hourly_candles("BTC/USDT", &long_setup_closes());
        let idea = CrossoverStrategy::default()
            .evaluate("BTC/USDT", &candles)
            .unwrap();

        assert_eq!(idea.side, Side::Long);
        assert_eq!(idea.entry, 115.75);
        assert!((idea.first_target().unwrap() - 115.75 * 1.03).abs() < 1e-9);
        assert!((idea.stop - 115.75 * 0.985).abs() < 1e-9);
        assert!(idea.stop < idea.entry && idea.entry < idea.first_target().unwrap());
    }

    #[test]
    fn test_short_setup_fires() {
        // Mirror of the long series around 300
        let mut closes: Vec<f64> = (0..61).map(|i| 200.0 - 0.5 * i as f64).collect();
        closes.extend((0..10).map(|i| 170.0 + 1.5 * (i + 1) as f64));
        closes.push(184.25);

        let candles = hourly_candles("ETH/USDT", &closes);
        let idea = CrossoverStrategy::default()
            .evaluate("ETH/USDT", &candles)
            .unwrap();

        assert_eq!(idea.side, Side::Short);
        assert!(idea.first_target().unwrap() < idea.entry && idea.entry < idea.stop);
    }

    #[test]
    fn test_quiet_market_produces_nothing() {
        let closes: Vec<f64> = vec![100.0; 80];
        let candles = hourly_candles("BTC/USDT", &closes);
        assert!(CrossoverStrategy::default()
            .evaluate("BTC/USDT", &candles)
            .is_none());
    }

    #[test]
    fn test_insufficient_history() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let candles = hourly_candles("BTC/USDT", &closes);
        assert!(CrossoverStrategy::default()
            .evaluate("BTC/USDT", &candles)
            .is_none());
    }
}
