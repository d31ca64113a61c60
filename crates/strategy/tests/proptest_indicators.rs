use proptest::prelude::*;
use strategy::indicators::{Macd, Rsi};

proptest! {
    /// RSI stays inside its 0..=100 band for any positive price path.
    #[test]
    fn rsi_is_bounded(
        period in 2usize..30,
        closes in prop::collection::vec(0.0001f64..1_000_000.0f64, 0..200),
    ) {
        let rsi = Rsi::new(period).unwrap();
        match rsi.latest(&closes) {
            Some(v) => prop_assert!((0.0..=100.0).contains(&v), "rsi {v}"),
            None => prop_assert!(closes.len() <= period),
        }
    }

    /// MACD never panics and answers exactly when history suffices.
    #[test]
    fn macd_answers_with_enough_history(
        fast in 1usize..10,
        extra in 1usize..20,
        signal in 1usize..10,
        closes in prop::collection::vec(0.0001f64..1_000_000.0f64, 0..120),
    ) {
        let macd = Macd::new(fast, fast + extra, signal).unwrap();
        let answer = macd.crossover(&closes);
        prop_assert_eq!(answer.is_some(), closes.len() >= macd.min_closes());
    }
}
