use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    collect_candles, unit_span, ActionType, CancelParam, Candle, CandleSeries, CandleUnit, Error, ExchangeGateway,
    ExchangeKind, ExchangeTradingInfo, OpenOrder, OrderCancelResult, OrderParam, OrderResult,
    OrderState, PriceType, Result, TradingTerm, WindowPlanner, DEFAULT_MAX_PAGE_SIZE,
};

/// A simulated execution, recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub instrument: String,
    pub action: ActionType,
    pub price: f64,
    pub volume: f64,
    pub filled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RestingOrder {
    key_pair_id: String,
    instrument: String,
    action: ActionType,
    price: f64,
    volume: f64,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Book {
    prices: HashMap<String, f64>,
    resting: HashMap<String, RestingOrder>,
    fills: Vec<PaperFill>,
}

/// Simulated exchange gateway for paper trading.
///
/// Market data comes either from candles seeded at build time or from a
/// live gateway (`market_data`); orders never leave the process. Limit
/// orders rest until the price crosses them or they are cancelled;
/// marketable and market orders fill immediately with slippage.
pub struct PaperExchange {
    planner: WindowPlanner,
    slippage_bps: f64,
    source: Option<Arc<dyn ExchangeGateway>>,
    candles: HashMap<(String, CandleUnit), Vec<Candle>>,
    book: Arc<RwLock<Book>>,
    snapshots: AtomicUsize,
}

impl PaperExchange {
    pub fn builder() -> PaperExchangeBuilder {
        PaperExchangeBuilder::default()
    }

    /// Move the market for `instrument`, filling any resting orders the new
    /// price crosses. Returns how many orders filled.
    pub async fn update_price(&self, instrument: &str, price: f64) -> usize {
        let mut book = self.book.write().await;
        book.prices.insert(instrument.to_string(), price);

        let crossed: Vec<String> = book
            .resting
            .iter()
            .filter(|(_, o)| o.instrument == instrument && crosses(o.action, o.price, price))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &crossed {
            if let Some(order) = book.resting.remove(id) {
                debug!(order_id = %id, instrument, price = order.price, "Paper resting order filled");
                book.fills.push(PaperFill {
                    order_id: id.clone(),
                    instrument: order.instrument,
                    action: order.action,
                    price: order.price,
                    volume: order.volume,
                    filled_at: Utc::now(),
                });
            }
        }
        crossed.len()
    }

    pub async fn fills(&self) -> Vec<PaperFill> {
        self.book.read().await.fills.clone()
    }

    /// Number of trading snapshots served so far.
    pub fn snapshots_served(&self) -> usize {
        self.snapshots.load(Ordering::Relaxed)
    }

    fn seeded(&self, instrument: &str, unit: CandleUnit) -> &[Candle] {
        self.candles
            .get(&(instrument.to_string(), unit))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn slipped(&self, action: ActionType, price: f64) -> f64 {
        match action {
            ActionType::Buy => price * (1.0 + self.slippage_bps / 10_000.0),
            _ => price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    /// Latest candles for `term`, from the live source when one is attached.
    async fn recent_candles(&self, instrument: &str, term: TradingTerm, key_pair_id: &str) -> Result<CandleSeries> {
        let unit = term.candle_unit();
        let Some(source) = &self.source else {
            let seeded = self.seeded(instrument, unit);
            let keep = seeded.len().saturating_sub(term.lookback_candles() as usize);
            return Ok(CandleSeries::new(ExchangeKind::Paper, instrument, unit, seeded[keep..].to_vec()));
        };

        let end = source.local_now();
        collect_candles(source.as_ref(), instrument, unit, end - term.lookback()?, end, key_pair_id).await
    }
}

fn crosses(action: ActionType, limit: f64, market: f64) -> bool {
    match action {
        ActionType::Buy => limit >= market,
        ActionType::Sell => limit <= market,
        _ => false,
    }
}

fn rejected(reason: impl Into<String>) -> Error {
    Error::OrderRejected { reason: reason.into() }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    fn exchange(&self) -> ExchangeKind {
        ExchangeKind::Paper
    }

    fn max_page_size(&self) -> u32 {
        self.planner.max_page_size()
    }

    fn local_now(&self) -> NaiveDateTime {
        match &self.source {
            Some(source) => source.local_now(),
            None => Utc::now().naive_utc(),
        }
    }

    async fn fetch_candles(
        &self,
        instrument: &str,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
        key_pair_id: &str,
    ) -> Result<CandleSeries> {
        if let Some(source) = &self.source {
            return source.fetch_candles(instrument, unit, start, end, key_pair_id).await;
        }

        // Like the exchange's `to`/`count`: the newest `row_count` bars before the page end.
        let window = self.planner.plan(unit, start, end)?;
        let seeded = self.seeded(instrument, unit);
        let before_end = seeded.partition_point(|c| c.open_time_local < window.effective_end);
        let first = before_end.saturating_sub(window.row_count as usize);
        Ok(CandleSeries::new(ExchangeKind::Paper, instrument, unit, seeded[first..before_end].to_vec()))
    }

    async fn fetch_trading_info(
        &self,
        instrument: &str,
        term: TradingTerm,
        key_pair_id: &str,
    ) -> Result<ExchangeTradingInfo> {
        self.snapshots.fetch_add(1, Ordering::Relaxed);

        let candles = self
            .recent_candles(instrument, term, key_pair_id)
            .await
            .map_err(|e| match e {
                Error::MarketDataUnavailable(_) => e,
                other => Error::MarketDataUnavailable(other.to_string()),
            })?;
        if self.source.is_some() {
            if let Some(last) = candles.last() {
                self.update_price(instrument, last.close).await;
            }
        }

        let book = self.book.read().await;
        let current_price = book
            .prices
            .get(instrument)
            .copied()
            .ok_or_else(|| Error::MarketDataUnavailable(format!("no paper price for {instrument}")))?;
        let open_orders = book
            .resting
            .iter()
            .filter(|(_, o)| o.instrument == instrument && o.key_pair_id == key_pair_id)
            .map(|(id, o)| OpenOrder {
                order_id: id.clone(),
                action: o.action,
                price: o.price,
                volume: o.volume,
                remaining_volume: o.volume,
                state: OrderState::Wait,
                created_at: o.created_at,
            })
            .collect();

        Ok(ExchangeTradingInfo {
            exchange: ExchangeKind::Paper,
            instrument: instrument.to_string(),
            term,
            current_price,
            candles,
            open_orders,
            fetched_at: Utc::now(),
        })
    }

    async fn place_order(&self, param: &OrderParam, key_pair_id: &str) -> Result<OrderResult> {
        let mut book = self.book.write().await;
        let market = book
            .prices
            .get(&param.instrument)
            .copied()
            .ok_or_else(|| rejected(format!("no paper price for {}", param.instrument)))?;

        let order_id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let (price, volume) = match (param.price_type, param.action) {
            (PriceType::Limit, action) => {
                if param.volume <= 0.0 || param.price <= 0.0 {
                    return Err(rejected("limit order needs positive volume and price"));
                }
                if !crosses(action, param.price, market) {
                    debug!(%order_id, instrument = %param.instrument, price = param.price, "Paper limit order resting");
                    book.resting.insert(
                        order_id.clone(),
                        RestingOrder {
                            key_pair_id: key_pair_id.to_string(),
                            instrument: param.instrument.clone(),
                            action,
                            price: param.price,
                            volume: param.volume,
                            created_at,
                        },
                    );
                    return Ok(OrderResult {
                        order_id,
                        state: OrderState::Wait,
                        created_at,
                    });
                }
                // Marketable limits fill at the better of limit and slipped market.
                let slipped = self.slipped(action, market);
                let fill = if action == ActionType::Buy {
                    slipped.min(param.price)
                } else {
                    slipped.max(param.price)
                };
                (fill, param.volume)
            }
            (PriceType::Market, ActionType::Buy) => {
                if param.price <= 0.0 {
                    return Err(rejected("market buy needs a positive spend"));
                }
                let fill = self.slipped(ActionType::Buy, market);
                (fill, param.price / fill)
            }
            (PriceType::Market, action) => {
                if param.volume <= 0.0 {
                    return Err(rejected("market sell needs a positive volume"));
                }
                (self.slipped(action, market), param.volume)
            }
        };

        debug!(%order_id, instrument = %param.instrument, action = %param.action, mid = market, fill = price, volume, "Paper fill simulated");
        book.fills.push(PaperFill {
            order_id: order_id.clone(),
            instrument: param.instrument.clone(),
            action: param.action,
            price,
            volume,
            filled_at: created_at,
        });

        Ok(OrderResult {
            order_id,
            state: OrderState::Done,
            created_at,
        })
    }

    async fn cancel_order(&self, param: &CancelParam, key_pair_id: &str) -> Result<OrderCancelResult> {
        let mut book = self.book.write().await;
        let owned = book
            .resting
            .get(&param.order_id)
            .is_some_and(|o| o.key_pair_id == key_pair_id);
        if !owned {
            return Err(rejected(format!("order {} not found", param.order_id)));
        }

        let order = book.resting.remove(&param.order_id);
        debug!(order_id = %param.order_id, "Paper order cancelled");
        Ok(OrderCancelResult {
            order_id: param.order_id.clone(),
            state: OrderState::Cancel,
            created_at: order.map(|o| o.created_at).unwrap_or_else(Utc::now),
        })
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

struct SeededSeries {
    instrument: String,
    unit: CandleUnit,
    start: NaiveDateTime,
    closes: Vec<f64>,
}

pub struct PaperExchangeBuilder {
    max_page_size: u32,
    slippage_bps: f64,
    source: Option<Arc<dyn ExchangeGateway>>,
    series: Vec<SeededSeries>,
    prices: HashMap<String, f64>,
}

impl Default for PaperExchangeBuilder {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            slippage_bps: 0.0,
            source: None,
            series: Vec::new(),
            prices: HashMap::new(),
        }
    }
}

impl PaperExchangeBuilder {
    pub fn max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn slippage_bps(mut self, slippage_bps: f64) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    /// Take candles and prices from a live gateway instead of seeded data.
    pub fn market_data(mut self, source: Arc<dyn ExchangeGateway>) -> Self {
        self.source = Some(source);
        self
    }

    /// Seed consecutive candles opening at `start`, one per close. Paper
    /// candles use the same instant for UTC and local time.
    pub fn candles(mut self, instrument: impl Into<String>, unit: CandleUnit, start: NaiveDateTime, closes: &[f64]) -> Self {
        self.series.push(SeededSeries {
            instrument: instrument.into(),
            unit,
            start,
            closes: closes.to_vec(),
        });
        self
    }

    pub fn price(mut self, instrument: impl Into<String>, price: f64) -> Self {
        self.prices.insert(instrument.into(), price);
        self
    }

    /// Instruments without an explicit price start at their last seeded close.
    pub fn build(self) -> Result<PaperExchange> {
        let planner = WindowPlanner::new(self.max_page_size)?;
        let mut candles: HashMap<(String, CandleUnit), Vec<Candle>> = HashMap::new();
        let mut prices = self.prices;

        for seed in self.series {
            let step = unit_span(seed.unit)?;
            let bars = candles.entry((seed.instrument.clone(), seed.unit)).or_default();
            for (i, close) in seed.closes.iter().copied().enumerate() {
                let open_time = step
                    .checked_mul(i as i32)
                    .and_then(|offset| seed.start.checked_add_signed(offset))
                    .ok_or_else(|| Error::InvalidUnit(format!("{} bars of {} overflow", seed.closes.len(), seed.unit)))?;
                bars.push(Candle {
                    open_time_utc: open_time,
                    open_time_local: open_time,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                    quote_volume: close,
                    timestamp: open_time.and_utc().timestamp_millis(),
                });
            }
            bars.sort_by_key(|c| c.open_time_utc);
            bars.dedup_by_key(|c| c.open_time_utc);
            if let Some(last) = seed.closes.last() {
                prices.entry(seed.instrument).or_insert(*last);
            }
        }

        info!(
            series = candles.len(),
            slippage_bps = self.slippage_bps,
            live_data = self.source.is_some(),
            "PaperExchange initialized"
        );
        Ok(PaperExchange {
            planner,
            slippage_bps: self.slippage_bps,
            source: self.source,
            candles,
            book: Arc::new(RwLock::new(Book {
                prices,
                ..Book::default()
            })),
            snapshots: AtomicUsize::new(0),
        })
    }
}
