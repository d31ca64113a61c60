use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{unit_span, Error, Result};

// ─── Candles ─────────────────────────────────────────────────────────────────

/// Calendar unit a candle granularity is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitType {
    Minute,
    Day,
    Week,
    /// Known to the exchange wire format, but no window arithmetic exists for it.
    Month,
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitType::Minute => write!(f, "MINUTE"),
            UnitType::Day => write!(f, "DAY"),
            UnitType::Week => write!(f, "WEEK"),
            UnitType::Month => write!(f, "MONTH"),
        }
    }
}

impl FromStr for UnitType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "min" | "minute" | "minutes" => Ok(UnitType::Minute),
            "day" | "days" => Ok(UnitType::Day),
            "week" | "weeks" => Ok(UnitType::Week),
            "month" | "months" => Ok(UnitType::Month),
            other => Err(Error::UnsupportedGranularity(other.to_string())),
        }
    }
}

/// Granularity of one candle: a calendar unit times a positive multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CandleUnit {
    unit_type: UnitType,
    size: u32,
}

impl CandleUnit {
    pub fn new(unit_type: UnitType, size: u32) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidUnit(format!(
                "{unit_type} size must be at least 1"
            )));
        }
        Ok(Self { unit_type, size })
    }

    pub fn minutes(size: u32) -> Result<Self> {
        Self::new(UnitType::Minute, size)
    }

    pub fn days(size: u32) -> Result<Self> {
        Self::new(UnitType::Day, size)
    }

    pub fn weeks(size: u32) -> Result<Self> {
        Self::new(UnitType::Week, size)
    }

    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

impl fmt::Display for CandleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.size, self.unit_type)
    }
}

/// One OHLC bar as returned by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time_utc: NaiveDateTime,
    /// Open time in the exchange's local time zone.
    pub open_time_local: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Traded base-asset volume.
    pub volume: f64,
    /// Traded quote-asset value.
    pub quote_volume: f64,
    /// Exchange timestamp of the last trade in the bar, in milliseconds.
    pub timestamp: i64,
}

/// Chronologically ordered candles for one instrument and granularity.
///
/// Construction sorts by `open_time_utc` and drops duplicate bars, so the
/// sequence is always strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSeries {
    pub exchange: ExchangeKind,
    pub instrument: String,
    pub unit: CandleUnit,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(
        exchange: ExchangeKind,
        instrument: impl Into<String>,
        unit: CandleUnit,
        mut candles: Vec<Candle>,
    ) -> Self {
        candles.sort_by_key(|c| c.open_time_utc);
        candles.dedup_by_key(|c| c.open_time_utc);
        Self {
            exchange,
            instrument: instrument.into(),
            unit,
            candles,
        }
    }

    pub fn empty(exchange: ExchangeKind, instrument: impl Into<String>, unit: CandleUnit) -> Self {
        Self::new(exchange, instrument, unit, Vec::new())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Close prices, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Merge another page into this series, keeping the ordering invariant.
    pub fn append(&mut self, page: CandleSeries) {
        let mut candles = std::mem::take(&mut self.candles);
        candles.extend(page.candles);
        candles.sort_by_key(|c| c.open_time_utc);
        candles.dedup_by_key(|c| c.open_time_utc);
        self.candles = candles;
    }
}

/// Which exchange a gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExchangeKind {
    Upbit,
    Paper,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Upbit => write!(f, "UPBIT"),
            ExchangeKind::Paper => write!(f, "PAPER"),
        }
    }
}

// ─── Trading vocabulary ──────────────────────────────────────────────────────

/// What a trading task asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "CANCEL")]
    Cancel,
    /// Nothing to do this cycle. Never reaches the exchange.
    #[serde(rename = "NONE")]
    NoOp,
}

impl ActionType {
    pub fn is_order(&self) -> bool {
        matches!(self, ActionType::Buy | ActionType::Sell)
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, ActionType::Cancel)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Buy => write!(f, "BUY"),
            ActionType::Sell => write!(f, "SELL"),
            ActionType::Cancel => write!(f, "CANCEL"),
            ActionType::NoOp => write!(f, "NONE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceType {
    Limit,
    /// Market buys spend `price` in quote currency; market sells sell `volume`.
    Market,
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceType::Limit => write!(f, "LIMIT"),
            PriceType::Market => write!(f, "MARKET"),
        }
    }
}

/// State of an order after an engine dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    /// Resting on the book.
    Wait,
    /// Reserved (stop) order waiting for its trigger.
    Watch,
    Done,
    Cancel,
    /// The exchange (or parameter validation) declined the request.
    Rejected,
    /// The request never got a definitive answer.
    Failed,
}

impl OrderState {
    pub fn is_failure(&self) -> bool {
        matches!(self, OrderState::Rejected | OrderState::Failed)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Wait => "WAIT",
            OrderState::Watch => "WATCH",
            OrderState::Done => "DONE",
            OrderState::Cancel => "CANCEL",
            OrderState::Rejected => "REJECTED",
            OrderState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Identifies the strategy variant that produced a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyCode {
    RsiReversal,
    MacdCross,
}

impl fmt::Display for StrategyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyCode::RsiReversal => write!(f, "RSI_REVERSAL"),
            StrategyCode::MacdCross => write!(f, "MACD_CROSS"),
        }
    }
}

/// How often a strategy trades, and therefore what history it looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingTerm {
    Scalping,
    Day,
    Swing,
}

impl TradingTerm {
    /// Candle granularity used for this term's market snapshot.
    pub fn candle_unit(&self) -> CandleUnit {
        match self {
            TradingTerm::Scalping => CandleUnit { unit_type: UnitType::Minute, size: 1 },
            TradingTerm::Day => CandleUnit { unit_type: UnitType::Minute, size: 15 },
            TradingTerm::Swing => CandleUnit { unit_type: UnitType::Day, size: 1 },
        }
    }

    /// Number of candles a snapshot covers.
    pub fn lookback_candles(&self) -> u32 {
        match self {
            TradingTerm::Scalping | TradingTerm::Day => 200,
            TradingTerm::Swing => 120,
        }
    }

    /// Time covered by `lookback_candles` candles of this term's unit.
    pub fn lookback(&self) -> Result<Duration> {
        unit_span(self.candle_unit())?
            .checked_mul(self.lookback_candles() as i32)
            .ok_or_else(|| Error::InvalidUnit(format!("lookback for {self} overflows")))
    }
}

impl fmt::Display for TradingTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingTerm::Scalping => write!(f, "scalping"),
            TradingTerm::Day => write!(f, "day"),
            TradingTerm::Swing => write!(f, "swing"),
        }
    }
}

// ─── Tasks and results ───────────────────────────────────────────────────────

/// One decision emitted by a strategy. The engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingTask {
    pub strategy_code: StrategyCode,
    pub instrument: String,
    pub action: ActionType,
    pub volume: f64,
    pub price: f64,
    pub price_type: PriceType,
    /// Order to cancel. Only set for `ActionType::Cancel`.
    pub order_id: Option<String>,
    /// Free-form correlation label the strategy can match outcomes against.
    pub tag: Option<String>,
}

impl TradingTask {
    pub fn buy(
        strategy_code: StrategyCode,
        instrument: impl Into<String>,
        volume: f64,
        price: f64,
        price_type: PriceType,
    ) -> Self {
        Self::order(strategy_code, instrument, ActionType::Buy, volume, price, price_type)
    }

    pub fn sell(
        strategy_code: StrategyCode,
        instrument: impl Into<String>,
        volume: f64,
        price: f64,
        price_type: PriceType,
    ) -> Self {
        Self::order(strategy_code, instrument, ActionType::Sell, volume, price, price_type)
    }

    pub fn cancel(
        strategy_code: StrategyCode,
        instrument: impl Into<String>,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            strategy_code,
            instrument: instrument.into(),
            action: ActionType::Cancel,
            volume: 0.0,
            price: 0.0,
            price_type: PriceType::Limit,
            order_id: Some(order_id.into()),
            tag: None,
        }
    }

    pub fn no_op(strategy_code: StrategyCode, instrument: impl Into<String>) -> Self {
        Self {
            strategy_code,
            instrument: instrument.into(),
            action: ActionType::NoOp,
            volume: 0.0,
            price: 0.0,
            price_type: PriceType::Limit,
            order_id: None,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn order(
        strategy_code: StrategyCode,
        instrument: impl Into<String>,
        action: ActionType,
        volume: f64,
        price: f64,
        price_type: PriceType,
    ) -> Self {
        Self {
            strategy_code,
            instrument: instrument.into(),
            action,
            volume,
            price,
            price_type,
            order_id: None,
            tag: None,
        }
    }
}

/// Normalized answer to an order placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

/// Normalized answer to an order cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelResult {
    pub order_id: String,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

/// What the engine believes happened to one dispatched task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingResult {
    pub strategy_code: StrategyCode,
    pub instrument: String,
    pub action: ActionType,
    pub state: OrderState,
    pub volume: f64,
    pub price: f64,
    pub price_type: PriceType,
    pub order_id: Option<String>,
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Why the dispatch failed; `None` on success.
    pub failure: Option<String>,
}

impl TradingResult {
    pub fn from_order(task: &TradingTask, order: &OrderResult) -> Self {
        Self::echo(task, order.state, Some(order.order_id.clone()), order.created_at, None)
    }

    pub fn from_cancel(task: &TradingTask, cancel: &OrderCancelResult) -> Self {
        Self::echo(task, cancel.state, Some(cancel.order_id.clone()), cancel.created_at, None)
    }

    /// Result for a task whose dispatch failed. Rejections (by the exchange or
    /// by parameter validation) become `Rejected`; anything else `Failed`.
    pub fn failed(task: &TradingTask, error: &Error) -> Self {
        let state = match error {
            Error::OrderRejected { .. } | Error::InvalidTask(_) => OrderState::Rejected,
            _ => OrderState::Failed,
        };
        Self::echo(task, state, task.order_id.clone(), Utc::now(), Some(error.to_string()))
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn echo(
        task: &TradingTask,
        state: OrderState,
        order_id: Option<String>,
        created_at: DateTime<Utc>,
        failure: Option<String>,
    ) -> Self {
        Self {
            strategy_code: task.strategy_code,
            instrument: task.instrument.clone(),
            action: task.action,
            state,
            volume: task.volume,
            price: task.price,
            price_type: task.price_type,
            order_id,
            tag: task.tag.clone(),
            created_at,
            failure,
        }
    }
}

// ─── Market snapshot ─────────────────────────────────────────────────────────

/// An order still open on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub action: ActionType,
    pub price: f64,
    pub volume: f64,
    pub remaining_volume: f64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

/// Everything a strategy may look at when deciding. The engine never reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeTradingInfo {
    pub exchange: ExchangeKind,
    pub instrument: String,
    pub term: TradingTerm,
    pub current_price: f64,
    pub candles: CandleSeries,
    pub open_orders: Vec<OpenOrder>,
    pub fetched_at: DateTime<Utc>,
}

// ─── Engine state ────────────────────────────────────────────────────────────

/// Phase of one strategy execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    FetchingInfo,
    Deciding,
    Dispatching,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Idle => write!(f, "idle"),
            CycleState::FetchingInfo => write!(f, "fetching_info"),
            CycleState::Deciding => write!(f, "deciding"),
            CycleState::Dispatching => write!(f, "dispatching"),
        }
    }
}

/// Whether the scheduler is ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the scheduler via its command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Whether orders go to the real exchange or the in-memory simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
