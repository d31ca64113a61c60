use common::{Error, Result};

/// Relative Strength Index with Wilder smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self> {
        if period < 2 {
            return Err(Error::Config(format!("RSI period must be >= 2, got {period}")));
        }
        Ok(Self { period })
    }

    /// RSI of the latest close. `None` until `period + 1` closes exist.
    pub fn latest(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() <= self.period {
            return None;
        }

        let n = self.period as f64;
        let mut changes = closes.windows(2).map(|w| w[1] - w[0]);

        let (mut gain, mut loss) = changes
            .by_ref()
            .take(self.period)
            .fold((0.0, 0.0), |(g, l), c| (g + c.max(0.0), l + (-c).max(0.0)));
        gain /= n;
        loss /= n;

        for c in changes {
            gain = (gain * (n - 1.0) + c.max(0.0)) / n;
            loss = (loss * (n - 1.0) + (-c).max(0.0)) / n;
        }

        if loss == 0.0 {
            return Some(if gain == 0.0 { 50.0 } else { 100.0 });
        }
        Some(100.0 - 100.0 / (1.0 + gain / loss))
    }
}
