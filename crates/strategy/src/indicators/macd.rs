use common::{Error, Result};

/// How the MACD line moved relative to its signal line on the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    /// MACD crossed above the signal line.
    Bullish,
    /// MACD crossed below the signal line.
    Bearish,
    Neutral,
}

/// MACD line = EMA(fast) − EMA(slow); signal = EMA(MACD, signal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self> {
        if fast == 0 || signal == 0 || fast >= slow {
            return Err(Error::Config(format!(
                "MACD needs 0 < fast < slow and signal > 0, got {fast}/{slow}/{signal}"
            )));
        }
        Ok(Self { fast, slow, signal })
    }

    /// Closes needed before a crossover can be evaluated.
    pub fn min_closes(&self) -> usize {
        self.slow + self.signal
    }

    /// Crossover on the latest close, or `None` with too little history.
    pub fn crossover(&self, closes: &[f64]) -> Option<Cross> {
        if closes.len() < self.min_closes() {
            return None;
        }

        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        // Both series end on the latest close, so align them from the back.
        let offset = fast.len() - slow.len();
        let line: Vec<f64> = slow
            .iter()
            .enumerate()
            .map(|(i, s)| fast[i + offset] - s)
            .collect();
        let signal = ema_series(&line, self.signal);

        let (prev_line, curr_line) = last_two(&line)?;
        let (prev_sig, curr_sig) = last_two(&signal)?;

        if prev_line <= prev_sig && curr_line > curr_sig {
            Some(Cross::Bullish)
        } else if prev_line >= prev_sig && curr_line < curr_sig {
            Some(Cross::Bearish)
        } else {
            Some(Cross::Neutral)
        }
    }
}

/// EMA seeded with the SMA of the first `period` values. Element `j` belongs
/// to `values[j + period - 1]`.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    for &v in &values[period..] {
        let prev = out[out.len() - 1];
        out.push(v * k + prev * (1.0 - k));
    }
    out
}

fn last_two(values: &[f64]) -> Option<(f64, f64)> {
    match values {
        [.., a, b] => Some((*a, *b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v_shape(n: usize) -> Vec<f64> {
        let mut prices: Vec<f64> = (0..n).map(|i| 100.0 - i as f64).collect();
        prices.extend((0..n).map(|i| 100.0 - n as f64 + i as f64 * 2.0));
        prices
    }

    #[test]
    fn invalid_periods_are_rejected() {
        assert!(Macd::new(26, 12, 9).is_err());
        assert!(Macd::new(0, 12, 9).is_err());
        assert!(Macd::new(12, 26, 0).is_err());
    }

    #[test]
    fn none_until_enough_history() {
        let macd = Macd::new(12, 26, 9).unwrap();
        assert!(macd.crossover(&[100.0; 34]).is_none());
        assert!(macd.crossover(&[100.0; 35]).is_some());
    }

    #[test]
    fn steady_trend_has_no_cross() {
        let macd = Macd::new(3, 6, 3).unwrap();
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.5).collect();
        assert_eq!(macd.crossover(&prices), Some(Cross::Neutral));
    }

    #[test]
    fn reversal_up_crosses_bullish() {
        let macd = Macd::new(3, 6, 3).unwrap();
        let prices = v_shape(20);
        let crossed = (macd.min_closes()..=prices.len())
            .any(|n| macd.crossover(&prices[..n]) == Some(Cross::Bullish));
        assert!(crossed);
    }

    #[test]
    fn reversal_down_crosses_bearish() {
        let macd = Macd::new(3, 6, 3).unwrap();
        let prices: Vec<f64> = v_shape(20).into_iter().map(|p| 300.0 - p).collect();
        let crossed = (macd.min_closes()..=prices.len())
            .any(|n| macd.crossover(&prices[..n]) == Some(Cross::Bearish));
        assert!(crossed);
    }
}
