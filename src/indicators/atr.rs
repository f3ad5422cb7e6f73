use crate::models::Candle;

/// Average True Range with Wilder's smoothing
///
/// True range of a bar is the greatest of high-low, |high - prev close|
/// and |low - prev close|. Returns None for fewer than `period + 1` candles.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_range = |prev: &Candle, cur: &Candle| -> f64 {
        (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs())
    };

    // Seed with the simple average of the first `period` true ranges
    let mut atr = candles[..period + 1]
        .windows(2)
        .map(|w| true_range(&w[0], &w[1]))
        .sum::<f64>()
        / period as f64;

    for w in candles[period..].windows(2) {
        let tr = true_range(&w[0], &w[1]);
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }

    Some(atr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candles_from(bars: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        bars.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                symbol: "TEST/USDT".to_string(),
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_atr_steady_range() {
        let bars = vec![(100.0, 101.0, 99.0, 100.0); 20];
        let atr = calculate_atr(&candles_from(&bars), 14).unwrap();
        // Every bar spans exactly 2.0
        assert!((atr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_atr_grows_with_volatility() {
        let calm = vec![(100.0, 101.0, 99.0, 100.0); 20];
        let mut wild = vec![(100.0, 101.0, 99.0, 100.0); 10];
        wild.extend(vec![(100.0, 112.0, 88.0, 104.0); 10]);

        let calm_atr = calculate_atr(&candles_from(&calm), 14).unwrap();
        let wild_atr = calculate_atr(&candles_from(&wild), 14).unwrap();
        assert!(wild_atr > calm_atr * 2.0);
    }

    #[test]
    fn test_atr_insufficient_data() {
        let bars = vec![(100.0, 101.0, 99.0, 100.0); 10];
        assert!(calculate_atr(&candles_from(&bars), 14).is_none());
    }
}
