use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use common::{
    ActionType, CancelParam, CycleState, ExchangeGateway, OrderParam, Result, StrategyCode,
    TradingResult, TradingTask, TradingTerm,
};
use strategy::Strategy;

/// Outcome counts for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub placed: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CycleReport {
    /// Tasks that reached a gateway call or failed validation on the way there.
    pub fn dispatched(&self) -> usize {
        self.placed + self.cancelled + self.failed
    }
}

/// Runs fetch → decide → dispatch cycles for one strategy instance.
///
/// The strategy sits behind an async mutex held for the whole cycle, so two
/// cycles on the same engine never interleave. Engines for different
/// strategies share only the gateway.
pub struct StrategyEngine {
    gateway: Arc<dyn ExchangeGateway>,
    strategy: Mutex<Box<dyn Strategy>>,
    key_pair_id: String,
    state: RwLock<CycleState>,
    // Copied out of the strategy so logging never waits on the cycle lock.
    name: String,
    code: StrategyCode,
    instrument: String,
    term: TradingTerm,
}

impl StrategyEngine {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        strategy: Box<dyn Strategy>,
        key_pair_id: impl Into<String>,
    ) -> Self {
        Self {
            name: strategy.name().to_string(),
            code: strategy.identify(),
            instrument: strategy.instrument().to_string(),
            term: strategy.term(),
            gateway,
            strategy: Mutex::new(strategy),
            key_pair_id: key_pair_id.into(),
            state: RwLock::new(CycleState::Idle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub async fn state(&self) -> CycleState {
        *self.state.read().await
    }

    /// Run one cycle, waiting for an in-flight cycle to finish first.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut strategy = self.strategy.lock().await;
        self.cycle(&mut **strategy).await
    }

    /// Run one cycle unless another is already in flight, in which case
    /// return `None` without touching the exchange.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleReport>> {
        let Ok(mut strategy) = self.strategy.try_lock() else {
            debug!(name = %self.name, "Cycle still in flight, skipping");
            return None;
        };
        Some(self.cycle(&mut **strategy).await)
    }

    async fn cycle(&self, strategy: &mut dyn Strategy) -> Result<CycleReport> {
        debug!(name = %self.name, instrument = %self.instrument, term = %self.term, "Cycle starting");

        self.set_state(CycleState::FetchingInfo).await;
        let info = match self
            .gateway
            .fetch_trading_info(&self.instrument, self.term, &self.key_pair_id)
            .await
        {
            Ok(info) => info,
            Err(e) => {
                warn!(name = %self.name, instrument = %self.instrument, error = %e, "Cycle aborted before deciding");
                self.set_state(CycleState::Idle).await;
                return Err(e);
            }
        };

        self.set_state(CycleState::Deciding).await;
        let tasks = strategy.decide(&info);

        self.set_state(CycleState::Dispatching).await;
        let mut report = CycleReport::default();
        for task in &tasks {
            self.dispatch(strategy, task, &mut report).await;
        }
        self.set_state(CycleState::Idle).await;

        info!(
            name = %self.name,
            code = %self.code,
            placed = report.placed,
            cancelled = report.cancelled,
            failed = report.failed,
            skipped = report.skipped,
            "Cycle finished"
        );
        Ok(report)
    }

    async fn dispatch(&self, strategy: &mut dyn Strategy, task: &TradingTask, report: &mut CycleReport) {
        match task.action {
            ActionType::Buy | ActionType::Sell => {
                let result = match OrderParam::from_task(task) {
                    Ok(param) => match self.gateway.place_order(&param, &self.key_pair_id).await {
                        Ok(order) => TradingResult::from_order(task, &order),
                        Err(e) => TradingResult::failed(task, &e),
                    },
                    Err(e) => TradingResult::failed(task, &e),
                };
                self.tally(&result, report);
                strategy.on_order_outcome(&result);
            }
            ActionType::Cancel => {
                let result = match CancelParam::from_task(task) {
                    Ok(param) => match self.gateway.cancel_order(&param, &self.key_pair_id).await {
                        Ok(cancel) => TradingResult::from_cancel(task, &cancel),
                        Err(e) => TradingResult::failed(task, &e),
                    },
                    Err(e) => TradingResult::failed(task, &e),
                };
                self.tally(&result, report);
                strategy.on_cancel_outcome(&result);
            }
            ActionType::NoOp => report.skipped += 1,
        }
    }

    fn tally(&self, result: &TradingResult, report: &mut CycleReport) {
        match &result.failure {
            None => {
                info!(
                    name = %self.name,
                    instrument = %result.instrument,
                    action = %result.action,
                    order_id = result.order_id.as_deref().unwrap_or(""),
                    state = ?result.state,
                    volume = result.volume,
                    price = result.price,
                    "Task dispatched"
                );
                if result.action.is_cancel() {
                    report.cancelled += 1;
                } else {
                    report.placed += 1;
                }
            }
            Some(reason) => {
                warn!(
                    name = %self.name,
                    instrument = %result.instrument,
                    action = %result.action,
                    state = ?result.state,
                    reason = %reason,
                    "Task failed"
                );
                report.failed += 1;
            }
        }
    }

    async fn set_state(&self, next: CycleState) {
        *self.state.write().await = next;
    }
}
