/// Simple Moving Average over the trailing `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let sum: f64 = prices[prices.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average, seeded with the SMA of the first `period` prices
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = calculate_sma(&prices[..period], period)?;

    for price in &prices[period..] {
        ema += alpha * (price - ema);
    }

    Some(ema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
    }

    #[test]
    fn test_sma_uses_most_recent_window() {
        let prices = vec![1.0, 1.0, 1.0, 100.0, 102.0];
        assert_eq!(calculate_sma(&prices, 2), Some(101.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_ema_tracks_trend() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema(&prices, 5).unwrap();
        // Should sit above the seed SMA in an uptrend
        assert!(ema > 104.0);
        assert!(ema < 110.0);
    }

    #[test]
    fn test_ema_flat_series() {
        let prices = vec![50.0; 30];
        let ema = calculate_ema(&prices, 20).unwrap();
        assert!((ema - 50.0).abs() < 1e-9);
    }
}
