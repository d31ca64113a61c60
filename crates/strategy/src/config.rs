use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::{Error, Result, TradingTerm};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "rsi_reversal"
/// name = "BTC RSI scalper"
/// instrument = "KRW-BTC"
/// term = "scalping"
/// volume = 0.001
///
/// [strategy.params]
/// period = 14
/// overbought = 70.0
/// oversold = 30.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier: "rsi_reversal" or "macd_cross".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs.
    pub name: String,
    /// Exchange market code, e.g. "KRW-BTC".
    pub instrument: String,
    pub term: TradingTerm,
    /// Order volume in base asset units.
    pub volume: f64,
    /// Credential handle for this instance; falls back to the global one.
    #[serde(default)]
    pub key_pair_id: Option<String>,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl StrategyConfig {
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        match self.params.get(key) {
            Some(toml::Value::Float(v)) => *v,
            Some(toml::Value::Integer(v)) => *v as f64,
            _ => default,
        }
    }

    pub fn param_usize(&self, key: &str, default: usize) -> usize {
        self.params
            .get(key)
            .and_then(|v| v.as_integer())
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(default)
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read strategy config at '{path}': {e}"));
        Self::parse(&content)
            .unwrap_or_else(|e| panic!("Failed to parse strategy config at '{path}': {e}"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[strategy]]
        type = "rsi_reversal"
        name = "BTC RSI"
        instrument = "KRW-BTC"
        term = "scalping"
        volume = 0.001

        [strategy.params]
        period = 10
        oversold = 25

        [[strategy]]
        type = "macd_cross"
        name = "ETH MACD"
        instrument = "KRW-ETH"
        term = "day"
        volume = 0.1
        key_pair_id = "eth-keys"
    "#;

    #[test]
    fn parses_multiple_strategies() {
        let cfg = StrategyFileConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.strategies.len(), 2);

        let rsi = &cfg.strategies[0];
        assert_eq!(rsi.term, TradingTerm::Scalping);
        assert_eq!(rsi.param_usize("period", 14), 10);
        assert_eq!(rsi.param_f64("oversold", 30.0), 25.0);
        assert_eq!(rsi.param_f64("overbought", 70.0), 70.0);
        assert!(rsi.key_pair_id.is_none());

        assert_eq!(cfg.strategies[1].key_pair_id.as_deref(), Some("eth-keys"));
    }

    #[test]
    fn unknown_term_is_a_config_error() {
        let bad = SAMPLE.replace("\"day\"", "\"hourly\"");
        assert!(matches!(StrategyFileConfig::parse(&bad), Err(Error::Config(_))));
    }
}
