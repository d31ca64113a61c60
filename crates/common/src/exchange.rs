use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tracing::debug;

use crate::{
    ActionType, CandleSeries, CandleUnit, Error, ExchangeKind, ExchangeTradingInfo,
    OrderCancelResult, OrderResult, PriceType, Result, TradingTask, TradingTerm, WindowPlanner,
};

/// Abstraction over one exchange's market-data and trading API.
///
/// `UpbitClient` implements this against the real exchange.
/// `PaperExchange` implements it in memory for simulation.
///
/// Every call takes an opaque `key_pair_id`; implementations resolve it to
/// credentials themselves. Implementations must be safe to share between
/// strategy engines running concurrently.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    fn exchange(&self) -> ExchangeKind;

    /// Largest number of candles one page request may return.
    fn max_page_size(&self) -> u32;

    /// Current time on the clock candle windows are expressed in.
    fn local_now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    /// Fetch one page of candles starting at `start`. The page ends at `end`
    /// or at the furthest point one page can reach, whichever comes first,
    /// and holds the planned `row_count` candles that open before that end.
    async fn fetch_candles(
        &self,
        instrument: &str,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
        key_pair_id: &str,
    ) -> Result<CandleSeries>;

    /// Snapshot of the market state a strategy decides on.
    async fn fetch_trading_info(
        &self,
        instrument: &str,
        term: TradingTerm,
        key_pair_id: &str,
    ) -> Result<ExchangeTradingInfo>;

    async fn place_order(&self, param: &OrderParam, key_pair_id: &str) -> Result<OrderResult>;

    async fn cancel_order(
        &self,
        param: &CancelParam,
        key_pair_id: &str,
    ) -> Result<OrderCancelResult>;
}

/// Fetch `[start, end)` one gateway page at a time.
///
/// Pages are planned with the gateway's own page limit and each starts where
/// the previous one ended. A minute page whose end sits on a whole minute is
/// one row short, so the candle opening at that page's start is not returned.
pub async fn collect_candles<G>(
    gateway: &G,
    instrument: &str,
    unit: CandleUnit,
    start: NaiveDateTime,
    end: NaiveDateTime,
    key_pair_id: &str,
) -> Result<CandleSeries>
where
    G: ExchangeGateway + ?Sized,
{
    let planner = WindowPlanner::new(gateway.max_page_size())?;
    let pages = planner.pages(unit, start, end)?;
    debug!(%instrument, %unit, pages = pages.len(), "Collecting candles");

    let mut series = CandleSeries::empty(gateway.exchange(), instrument, unit);
    for page in pages.into_iter().filter(|p| p.row_count > 0) {
        let chunk = gateway
            .fetch_candles(instrument, unit, page.start, page.effective_end, key_pair_id)
            .await?;
        series.append(chunk);
    }
    Ok(series)
}

/// A validated order placement request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderParam {
    pub instrument: String,
    pub action: ActionType,
    pub volume: f64,
    pub price: f64,
    pub price_type: PriceType,
}

impl OrderParam {
    /// Build an order request from a buy or sell task.
    ///
    /// Limit orders need a positive volume and price. Market buys spend
    /// `price` and ignore volume; market sells need only a volume.
    pub fn from_task(task: &TradingTask) -> Result<Self> {
        if !task.action.is_order() {
            return Err(Error::InvalidTask(format!(
                "{} is not an order action",
                task.action
            )));
        }
        if task.instrument.is_empty() {
            return Err(Error::InvalidTask("instrument is empty".into()));
        }

        let needs_volume = !(task.price_type == PriceType::Market && task.action == ActionType::Buy);
        let needs_price = !(task.price_type == PriceType::Market && task.action == ActionType::Sell);
        if needs_volume && !is_positive(task.volume) {
            return Err(Error::InvalidTask(format!("volume must be positive, got {}", task.volume)));
        }
        if needs_price && !is_positive(task.price) {
            return Err(Error::InvalidTask(format!("price must be positive, got {}", task.price)));
        }

        Ok(Self {
            instrument: task.instrument.clone(),
            action: task.action,
            volume: task.volume,
            price: task.price,
            price_type: task.price_type,
        })
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// A validated order cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelParam {
    pub order_id: String,
}

impl CancelParam {
    pub fn from_task(task: &TradingTask) -> Result<Self> {
        if !task.action.is_cancel() {
            return Err(Error::InvalidTask(format!(
                "{} is not a cancel action",
                task.action
            )));
        }
        match task.order_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(Self {
                order_id: id.to_string(),
            }),
            _ => Err(Error::InvalidTask("cancel task has no order id".into())),
        }
    }
}
