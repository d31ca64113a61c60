use thiserror::Error;

use crate::UnitType;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported candle granularity: {0}")]
    UnsupportedGranularity(String),

    #[error("Candle page size exceeded: {requested} rows requested, max {max}")]
    PageSizeExceeded { requested: i64, max: u32 },

    #[error("Invalid time range: end {end} is not after start {start}")]
    InvalidRange { start: String, end: String },

    #[error("Invalid candle unit: {0}")]
    InvalidUnit(String),

    #[error("Invalid trading task: {0}")]
    InvalidTask(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn unsupported(unit_type: UnitType) -> Self {
        Error::UnsupportedGranularity(unit_type.to_string())
    }

    /// Network or timeout failures may succeed when retried; rejections will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransportFailure(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
