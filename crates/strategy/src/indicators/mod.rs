pub mod macd;
pub mod rsi;

pub use macd::{Cross, Macd};
pub use rsi::Rsi;
