use tracing::info;

use common::{Error, Result};

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::{MacdCross, RsiReversal, Strategy};

/// A configured strategy instance plus the credential handle it trades with.
pub struct RegisteredStrategy {
    pub strategy: Box<dyn Strategy>,
    pub key_pair_id: Option<String>,
}

/// Holds every configured strategy instance until the engines take them.
pub struct StrategyRegistry {
    strategies: Vec<RegisteredStrategy>,
}

impl StrategyRegistry {
    /// Build the registry from config. Unknown strategy types or invalid
    /// parameters fail the whole load.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut strategies = Vec::with_capacity(file_cfg.strategies.len());

        for cfg in &file_cfg.strategies {
            let strategy = build_strategy(cfg)?;
            info!(
                name = %strategy.name(),
                code = %strategy.identify(),
                instrument = %strategy.instrument(),
                term = %strategy.term(),
                "Registered strategy"
            );
            strategies.push(RegisteredStrategy {
                strategy,
                key_pair_id: cfg.key_pair_id.clone(),
            });
        }

        Ok(Self { strategies })
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Distinct instruments across all strategies, in config order.
    pub fn instruments(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for s in &self.strategies {
            let instrument = s.strategy.instrument().to_string();
            if !seen.contains(&instrument) {
                seen.push(instrument);
            }
        }
        seen
    }

    pub fn into_strategies(self) -> Vec<RegisteredStrategy> {
        self.strategies
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    match cfg.strategy_type.as_str() {
        "rsi_reversal" => Ok(Box::new(RsiReversal::from_config(cfg.clone())?)),
        "macd_cross" => Ok(Box::new(MacdCross::from_config(cfg.clone())?)),
        other => Err(Error::Config(format!(
            "unknown strategy type '{other}' for '{}'",
            cfg.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{StrategyCode, TradingTerm};

    const CONFIG: &str = r#"
        [[strategy]]
        type = "rsi_reversal"
        name = "BTC RSI"
        instrument = "KRW-BTC"
        term = "scalping"
        volume = 0.001

        [[strategy]]
        type = "macd_cross"
        name = "BTC MACD"
        instrument = "KRW-BTC"
        term = "swing"
        volume = 0.002
        key_pair_id = "swing-keys"

        [[strategy]]
        type = "rsi_reversal"
        name = "ETH RSI"
        instrument = "KRW-ETH"
        term = "day"
        volume = 0.1
    "#;

    #[test]
    fn builds_every_configured_strategy() {
        let registry = StrategyRegistry::from_config(&StrategyFileConfig::parse(CONFIG).unwrap()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.instruments(), vec!["KRW-BTC".to_string(), "KRW-ETH".to_string()]);

        let strategies = registry.into_strategies();
        assert_eq!(strategies[1].strategy.identify(), StrategyCode::MacdCross);
        assert_eq!(strategies[1].strategy.term(), TradingTerm::Swing);
        assert_eq!(strategies[1].key_pair_id.as_deref(), Some("swing-keys"));
        assert_eq!(strategies[2].strategy.name(), "ETH RSI");
    }

    #[test]
    fn unknown_type_fails_the_load() {
        let bad = CONFIG.replace("macd_cross", "grid");
        let err = StrategyRegistry::from_config(&StrategyFileConfig::parse(&bad).unwrap()).err();
        assert!(matches!(err, Some(Error::Config(msg)) if msg.contains("grid")));
    }

    #[test]
    fn invalid_params_fail_the_load() {
        let bad = CONFIG.replacen("volume = 0.001", "volume = 0.001\n[strategy.params]\nperiod = 1", 1);
        assert!(StrategyRegistry::from_config(&StrategyFileConfig::parse(&bad).unwrap()).is_err());
    }
}
