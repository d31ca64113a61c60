pub mod config;
pub mod indicators;
pub mod macd_cross;
pub mod position;
pub mod registry;
pub mod rsi_reversal;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use macd_cross::MacdCross;
pub use position::PositionTracker;
pub use registry::StrategyRegistry;
pub use rsi_reversal::RsiReversal;

use common::{ExchangeTradingInfo, StrategyCode, TradingResult, TradingTask, TradingTerm};

/// All strategy implementations must satisfy this trait.
///
/// A strategy instance is bound to one instrument and trading term. The
/// engine calls `decide` once per cycle and reports every dispatched task
/// back through exactly one outcome callback; `NONE` tasks get no callback.
pub trait Strategy: Send + Sync {
    fn identify(&self) -> StrategyCode;

    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The instrument this strategy trades (e.g. "KRW-BTC").
    fn instrument(&self) -> &str;

    fn term(&self) -> TradingTerm;

    /// Turn a market snapshot into an ordered list of tasks.
    ///
    /// May update the strategy's own bookkeeping from the snapshot but must
    /// never reach the exchange; the engine performs every task.
    fn decide(&mut self, info: &ExchangeTradingInfo) -> Vec<TradingTask>;

    fn on_order_outcome(&mut self, result: &TradingResult);

    fn on_cancel_outcome(&mut self, result: &TradingResult);
}
