/// Relative Strength Index over closing prices
///
/// Uses Wilder's smoothing for the average gain/loss, so values line up
/// with what charting tools report rather than a plain rolling mean.
///
/// Returns None when there are fewer than `period + 1` prices.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    // Seed with the simple average of the first `period` changes
    for w in prices[..period + 1].windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    // Wilder smoothing over the remaining changes
    for w in prices[period..].windows(2) {
        let change = w[1] - w[0];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_in_range() {
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];

        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!(rsi > 0.0 && rsi < 100.0);
        // Mostly rising series, so momentum should read bullish
        assert!(rsi > 50.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        assert!(calculate_rsi(&prices, 14).is_none());
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        assert_eq!(calculate_rsi(&prices, 5), Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let prices = vec![105.0, 104.0, 103.0, 102.0, 101.0, 100.0];
        assert_eq!(calculate_rsi(&prices, 5), Some(0.0));
    }
}
