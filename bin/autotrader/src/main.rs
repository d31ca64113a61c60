use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, ExchangeGateway, TradingMode};
use engine::{Scheduler, StaticKeyResolver, StrategyEngine, UpbitClient};
use paper::PaperExchange;
use strategy::{StrategyFileConfig, StrategyRegistry};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, base_url = %cfg.upbit_base_url, "Autotrader starting");

    // ── Exchange gateway (injected based on TRADING_MODE) ─────────────────────
    let mut keys = StaticKeyResolver::new();
    if let (Some(access), Some(secret)) = (&cfg.upbit_access_key, &cfg.upbit_secret_key) {
        keys = keys.with_key(cfg.key_pair_id.clone(), access.clone(), secret.clone());
    }
    let upbit = UpbitClient::new(
        cfg.upbit_base_url.clone(),
        cfg.max_page_size,
        Duration::from_secs(cfg.http_timeout_secs),
        Arc::new(keys),
    )
    .unwrap_or_else(|e| panic!("Failed to build Upbit client: {e}"));

    let gateway: Arc<dyn ExchangeGateway> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using UpbitClient");
            Arc::new(upbit)
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, Upbit market data with simulated orders");
            let exchange = PaperExchange::builder()
                .max_page_size(cfg.max_page_size)
                .slippage_bps(cfg.paper_slippage_bps)
                .market_data(Arc::new(upbit))
                .build()
                .unwrap_or_else(|e| panic!("Failed to build paper exchange: {e}"));
            Arc::new(exchange)
        }
    };

    // ── Strategies ────────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path);
    let registry = StrategyRegistry::from_config(&strategy_file)
        .unwrap_or_else(|e| panic!("Invalid strategy config: {e}"));
    if registry.is_empty() {
        warn!(path = %cfg.strategy_config_path, "No strategies configured");
    }
    info!(strategies = registry.len(), instruments = ?registry.instruments(), "Strategies loaded");

    let engines: Vec<Arc<StrategyEngine>> = registry
        .into_strategies()
        .into_iter()
        .map(|registered| {
            let key_pair_id = registered.key_pair_id.unwrap_or_else(|| cfg.key_pair_id.clone());
            Arc::new(StrategyEngine::new(gateway.clone(), registered.strategy, key_pair_id))
        })
        .collect();

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let (scheduler, handle) = Scheduler::new(engines, Duration::from_secs(cfg.cycle_interval_secs));
    tokio::spawn(scheduler.run());
    handle.send(EngineCommand::Start).await;

    // Keep main alive
    info!(interval_secs = cfg.cycle_interval_secs, "Scheduler started. Waiting for shutdown signal.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    handle.send(EngineCommand::Stop).await;
    info!("Shutdown signal received. Exiting.");
}
