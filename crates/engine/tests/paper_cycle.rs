//! Full cycles against the paper exchange with a real strategy.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{ActionType, CandleUnit, CycleState, ExchangeGateway};
use engine::StrategyEngine;
use paper::PaperExchange;
use strategy::{StrategyFileConfig, StrategyRegistry};

const CONFIG: &str = r#"
    [[strategy]]
    type = "rsi_reversal"
    name = "BTC RSI"
    instrument = "KRW-BTC"
    term = "scalping"
    volume = 0.5

    [strategy.params]
    period = 3
"#;

fn engine(closes: &[f64]) -> (StrategyEngine, Arc<PaperExchange>) {
    let start = (Utc::now() - Duration::minutes(closes.len() as i64)).naive_utc();
    let exchange = Arc::new(
        PaperExchange::builder()
            .candles("KRW-BTC", CandleUnit::minutes(1).unwrap(), start, closes)
            .build()
            .unwrap(),
    );
    let strategy = StrategyRegistry::from_config(&StrategyFileConfig::parse(CONFIG).unwrap())
        .unwrap()
        .into_strategies()
        .remove(0)
        .strategy;
    let gateway: Arc<dyn ExchangeGateway> = exchange.clone();
    (StrategyEngine::new(gateway, strategy, "paper"), exchange)
}

#[tokio::test]
async fn oversold_market_buys_once_then_holds() {
    let (engine, exchange) = engine(&[110.0, 108.0, 106.0, 104.0, 102.0, 100.0]);

    let first = engine.run_cycle().await.unwrap();
    assert_eq!(first.placed, 1);
    assert_eq!(engine.state().await, CycleState::Idle);

    // Limit at the current price is marketable on paper and fills at once.
    let fills = exchange.fills().await;
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].action, ActionType::Buy);
    assert_eq!(fills[0].price, 100.0);

    // Position is now full, so the next cycle holds.
    let second = engine.run_cycle().await.unwrap();
    assert_eq!((second.placed, second.skipped), (0, 1));
}

#[tokio::test]
async fn missing_price_aborts_the_cycle() {
    let (engine, _) = engine(&[]);
    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, common::Error::MarketDataUnavailable(_)));
    assert_eq!(engine.state().await, CycleState::Idle);
}
