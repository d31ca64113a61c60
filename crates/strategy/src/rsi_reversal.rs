use chrono::Duration;
use tracing::{debug, info};

use common::{
    Error, ExchangeTradingInfo, PriceType, Result, StrategyCode, TradingResult, TradingTask,
    TradingTerm,
};

use crate::config::StrategyConfig;
use crate::indicators::Rsi;
use crate::position::PositionTracker;
use crate::Strategy;

const ENTRY_TAG: &str = "rsi-entry";
const EXIT_TAG: &str = "rsi-exit";

/// Buys with a limit order at the current price when RSI is oversold and
/// sells everything at market once it turns overbought.
///
/// Params: `period` (14), `oversold` (30), `overbought` (70),
/// `max_position` (one order's volume), `max_order_age_secs` (300).
pub struct RsiReversal {
    cfg: StrategyConfig,
    rsi: Rsi,
    oversold: f64,
    overbought: f64,
    max_position: f64,
    max_order_age: Duration,
    tracker: PositionTracker,
}

impl RsiReversal {
    pub fn from_config(cfg: StrategyConfig) -> Result<Self> {
        let rsi = Rsi::new(cfg.param_usize("period", 14))?;
        let oversold = cfg.param_f64("oversold", 30.0);
        let overbought = cfg.param_f64("overbought", 70.0);
        if !(0.0..=100.0).contains(&oversold) || !(0.0..=100.0).contains(&overbought) || oversold >= overbought {
            return Err(Error::Config(format!(
                "{}: need 0 <= oversold < overbought <= 100, got {oversold}/{overbought}",
                cfg.name
            )));
        }
        if cfg.volume <= 0.0 {
            return Err(Error::Config(format!("{}: volume must be positive", cfg.name)));
        }
        let max_position = cfg.param_f64("max_position", cfg.volume);
        let max_order_age = Duration::seconds(cfg.param_usize("max_order_age_secs", 300) as i64);

        Ok(Self {
            cfg,
            rsi,
            oversold,
            overbought,
            max_position,
            max_order_age,
            tracker: PositionTracker::new(),
        })
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    fn hold(&self) -> Vec<TradingTask> {
        vec![TradingTask::no_op(self.identify(), self.cfg.instrument.clone())]
    }
}

impl Strategy for RsiReversal {
    fn identify(&self) -> StrategyCode {
        StrategyCode::RsiReversal
    }

    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn instrument(&self) -> &str {
        &self.cfg.instrument
    }

    fn term(&self) -> TradingTerm {
        self.cfg.term
    }

    fn decide(&mut self, info: &ExchangeTradingInfo) -> Vec<TradingTask> {
        self.tracker.settle(info);

        // Clear resting orders before committing to anything new.
        let cancels = self.tracker.stale_cancels(self.identify(), info, self.max_order_age);
        if !cancels.is_empty() {
            return cancels;
        }

        let Some(rsi) = self.rsi.latest(&info.candles.closes()) else {
            debug!(name = %self.cfg.name, candles = info.candles.len(), "Not enough candles for RSI");
            return self.hold();
        };
        if info.current_price <= 0.0 || self.tracker.has_open_order(info) {
            return self.hold();
        }

        let code = self.identify();
        if rsi <= self.oversold && self.tracker.exposure() + self.cfg.volume <= self.max_position + f64::EPSILON {
            info!(name = %self.cfg.name, rsi, price = info.current_price, "RSI oversold, buying");
            return vec![TradingTask::buy(
                code,
                self.cfg.instrument.clone(),
                self.cfg.volume,
                info.current_price,
                PriceType::Limit,
            )
            .with_tag(ENTRY_TAG)];
        }

        let held = self.tracker.held_volume();
        if rsi >= self.overbought && held > 0.0 {
            info!(name = %self.cfg.name, rsi, volume = held, "RSI overbought, selling");
            return vec![TradingTask::sell(
                code,
                self.cfg.instrument.clone(),
                held,
                info.current_price,
                PriceType::Market,
            )
            .with_tag(EXIT_TAG)];
        }

        self.hold()
    }

    fn on_order_outcome(&mut self, result: &TradingResult) {
        self.tracker.record_order(result);
    }

    fn on_cancel_outcome(&mut self, result: &TradingResult) {
        self.tracker.record_cancel(result);
    }
}
