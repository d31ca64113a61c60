use chrono::Duration;
use tracing::info;

use common::{
    Error, ExchangeTradingInfo, PriceType, Result, StrategyCode, TradingResult, TradingTask,
    TradingTerm,
};

use crate::config::StrategyConfig;
use crate::indicators::{Cross, Macd};
use crate::position::PositionTracker;
use crate::Strategy;

const GOLDEN_TAG: &str = "macd-golden-cross";
const DEAD_TAG: &str = "macd-dead-cross";

/// Market-buys on a bullish MACD crossover and market-sells the whole
/// position on a bearish one.
///
/// Params: `fast` (12), `slow` (26), `signal` (9), `max_position`,
/// `max_order_age_secs` (300).
pub struct MacdCross {
    cfg: StrategyConfig,
    macd: Macd,
    max_position: f64,
    max_order_age: Duration,
    tracker: PositionTracker,
}

impl MacdCross {
    pub fn from_config(cfg: StrategyConfig) -> Result<Self> {
        let macd = Macd::new(
            cfg.param_usize("fast", 12),
            cfg.param_usize("slow", 26),
            cfg.param_usize("signal", 9),
        )?;
        if cfg.volume <= 0.0 {
            return Err(Error::Config(format!("{}: volume must be positive", cfg.name)));
        }
        let max_position = cfg.param_f64("max_position", cfg.volume);
        let max_order_age = Duration::seconds(cfg.param_usize("max_order_age_secs", 300) as i64);
        Ok(Self {
            cfg,
            macd,
            max_position,
            max_order_age,
            tracker: PositionTracker::new(),
        })
    }
}

impl Strategy for MacdCross {
    fn identify(&self) -> StrategyCode {
        StrategyCode::MacdCross
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
        let code = self.identify();

        let mut tasks = self.tracker.stale_cancels(code, info, self.max_order_age);
        let cross = self.macd.crossover(&info.candles.closes());

        match cross {
            Some(Cross::Bullish)
                if info.current_price > 0.0
                    && self.tracker.exposure() + self.cfg.volume <= self.max_position + f64::EPSILON =>
            {
                // Market buys are sized by what they spend.
                let spend = self.cfg.volume * info.current_price;
                info!(name = %self.cfg.name, spend, "MACD golden cross, buying");
                tasks.push(
                    TradingTask::buy(code, self.cfg.instrument.clone(), self.cfg.volume, spend, PriceType::Market)
                        .with_tag(GOLDEN_TAG),
                );
            }
            Some(Cross::Bearish) if self.tracker.held_volume() > 0.0 => {
                let held = self.tracker.held_volume();
                info!(name = %self.cfg.name, volume = held, "MACD dead cross, selling");
                tasks.push(
                    TradingTask::sell(code, self.cfg.instrument.clone(), held, info.current_price, PriceType::Market)
                        .with_tag(DEAD_TAG),
                );
            }
            _ => {}
        }

        if tasks.is_empty() {
            tasks.push(TradingTask::no_op(code, self.cfg.instrument.clone()));
        }
        tasks
    }

    fn on_order_outcome(&mut self, result: &TradingResult) {
        self.tracker.record_order(result);
    }

    fn on_cancel_outcome(&mut self, result: &TradingResult) {
        self.tracker.record_cancel(result);
    }
}
