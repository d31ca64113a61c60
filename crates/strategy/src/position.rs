use std::collections::HashMap;

use chrono::Duration;
use tracing::{debug, warn};

use common::{ActionType, ExchangeTradingInfo, OrderState, StrategyCode, TradingResult, TradingTask};

/// Tag carried by cancels of orders that rested too long.
pub const STALE_TAG: &str = "stale-cancel";

/// An order this strategy placed that has not yet filled or been cancelled.
#[derive(Debug, Clone, PartialEq)]
struct Pending {
    action: ActionType,
    volume: f64,
}

/// Per-strategy view of what it holds, built purely from outcome callbacks.
///
/// Limit orders that come back `WAIT` are tracked as pending. A pending
/// order that is missing from a later snapshot's open orders is treated as
/// filled once `settle` sees that snapshot.
#[derive(Debug, Default, Clone)]
pub struct PositionTracker {
    held_volume: f64,
    pending: HashMap<String, Pending>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base-asset volume known to be filled.
    pub fn held_volume(&self) -> f64 {
        self.held_volume
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Filled volume plus every pending buy.
    pub fn exposure(&self) -> f64 {
        let pending_buys: f64 = self
            .pending
            .values()
            .filter(|p| p.action == ActionType::Buy)
            .map(|p| p.volume)
            .sum();
        self.held_volume + pending_buys
    }

    /// True while any of this strategy's orders is still resting.
    pub fn has_open_order(&self, info: &ExchangeTradingInfo) -> bool {
        self.pending.keys().any(|id| is_open(info, id))
    }

    /// Ids of this strategy's open orders older than `max_age` at snapshot time.
    pub fn stale_orders(&self, info: &ExchangeTradingInfo, max_age: Duration) -> Vec<String> {
        let mut ids: Vec<String> = info
            .open_orders
            .iter()
            .filter(|o| self.pending.contains_key(&o.order_id))
            .filter(|o| info.fetched_at - o.created_at > max_age)
            .map(|o| o.order_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Cancel tasks for every stale order, in id order.
    pub fn stale_cancels(
        &self,
        code: StrategyCode,
        info: &ExchangeTradingInfo,
        max_age: Duration,
    ) -> Vec<TradingTask> {
        self.stale_orders(info, max_age)
            .into_iter()
            .map(|id| TradingTask::cancel(code, info.instrument.clone(), id).with_tag(STALE_TAG))
            .collect()
    }

    pub fn record_order(&mut self, result: &TradingResult) {
        if !result.is_success() {
            warn!(
                instrument = %result.instrument,
                action = %result.action,
                tag = ?result.tag,
                reason = ?result.failure,
                "Order failed; position unchanged"
            );
            return;
        }

        match result.state {
            OrderState::Done => self.apply_fill(result.action, result.volume),
            OrderState::Wait | OrderState::Watch => {
                if let Some(id) = &result.order_id {
                    self.pending.insert(
                        id.clone(),
                        Pending {
                            action: result.action,
                            volume: result.volume,
                        },
                    );
                }
            }
            other => debug!(state = %other, "Order outcome needs no position change"),
        }
    }

    pub fn record_cancel(&mut self, result: &TradingResult) {
        match (&result.order_id, result.is_success()) {
            (Some(id), true) => {
                self.pending.remove(id);
            }
            (id, _) => warn!(
                order_id = ?id,
                reason = ?result.failure,
                "Cancel failed; order still tracked"
            ),
        }
    }

    /// Fold pending orders that have left the book into the filled volume.
    pub fn settle(&mut self, info: &ExchangeTradingInfo) {
        let settled: Vec<String> = self
            .pending
            .keys()
            .filter(|id| !is_open(info, id))
            .cloned()
            .collect();
        for id in settled {
            if let Some(p) = self.pending.remove(&id) {
                self.apply_fill(p.action, p.volume);
            }
        }
    }

    fn apply_fill(&mut self, action: ActionType, volume: f64) {
        match action {
            ActionType::Buy => self.held_volume += volume,
            ActionType::Sell => self.held_volume = (self.held_volume - volume).max(0.0),
            ActionType::Cancel | ActionType::NoOp => {}
        }
    }
}

fn is_open(info: &ExchangeTradingInfo, order_id: &str) -> bool {
    info.open_orders.iter().any(|o| o.order_id == order_id)
}
