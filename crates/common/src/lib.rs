pub mod config;
pub mod error;
pub mod exchange;
pub mod types;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{collect_candles, CancelParam, ExchangeGateway, OrderParam};
pub use types::*;
pub use window::{unit_span, CandleWindow, WindowPlanner, DEFAULT_MAX_PAGE_SIZE};
