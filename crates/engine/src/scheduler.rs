use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use common::{EngineCommand, EngineState};

use crate::cycle::StrategyEngine;

/// Cloneable handle for driving the scheduler from outside its task.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
}

impl SchedulerHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// Ticks every strategy engine on a fixed interval.
///
/// Each engine gets its own interval task. A tick that lands while the
/// previous cycle is still running, or while the scheduler is paused, is
/// skipped rather than queued.
pub struct Scheduler {
    engines: Vec<Arc<StrategyEngine>>,
    period: Duration,
    state: Arc<RwLock<EngineState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Scheduler {
    pub fn new(engines: Vec<Arc<StrategyEngine>>, period: Duration) -> (Self, SchedulerHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = SchedulerHandle {
            command_tx,
            state: state.clone(),
        };

        let scheduler = Scheduler {
            engines,
            period,
            state,
            command_rx,
        };

        (scheduler, handle)
    }

    /// Process commands until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(engines = self.engines.len(), "Scheduler initialized in Stopped state. Waiting for Start command.");

        let mut tick_handles: Vec<tokio::task::JoinHandle<()>> = Vec::new();

        loop {
            match self.command_rx.recv().await {
                Some(EngineCommand::Start) => {
                    let current = *self.state.read().await;
                    if current != EngineState::Stopped {
                        info!(state = %current, "Scheduler already started");
                        continue;
                    }

                    info!(period_secs = self.period.as_secs_f64(), "Starting strategy ticks");
                    *self.state.write().await = EngineState::Running;

                    for engine in &self.engines {
                        let handle = tokio::spawn(tick_loop(engine.clone(), self.period, self.state.clone()));
                        tick_handles.push(handle);
                    }
                }

                Some(EngineCommand::Stop) => {
                    // In-flight cycles run on their own tasks and finish normally.
                    info!("Scheduler stopping, aborting tick tasks");
                    *self.state.write().await = EngineState::Stopped;
                    for h in tick_handles.drain(..) {
                        h.abort();
                    }
                }

                Some(EngineCommand::Pause) => {
                    let current = *self.state.read().await;
                    if current == EngineState::Running {
                        info!("Scheduler paused, ticks suppressed");
                        *self.state.write().await = EngineState::Paused;
                    }
                }

                Some(EngineCommand::Resume) => {
                    let current = *self.state.read().await;
                    if current == EngineState::Paused {
                        info!("Scheduler resumed");
                        *self.state.write().await = EngineState::Running;
                    }
                }

                None => {
                    warn!("Scheduler command channel closed, shutting down");
                    for h in tick_handles.drain(..) {
                        h.abort();
                    }
                    break;
                }
            }
        }
    }
}

async fn tick_loop(engine: Arc<StrategyEngine>, period: Duration, state: Arc<RwLock<EngineState>>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if *state.read().await != EngineState::Running {
            continue;
        }

        let engine = engine.clone();
        tokio::spawn(async move {
            match engine.try_run_cycle().await {
                None => info!(name = %engine.name(), "Tick skipped, previous cycle still running"),
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(name = %engine.name(), instrument = %engine.instrument(), error = %e, "Cycle failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::CandleUnit;
    use paper::PaperExchange;
    use strategy::{StrategyFileConfig, StrategyRegistry};

    fn engine() -> (Arc<StrategyEngine>, Arc<PaperExchange>) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let exchange = Arc::new(
            PaperExchange::builder()
                .candles("KRW-BTC", CandleUnit::minutes(1).unwrap(), start, &[100.0; 10])
                .price("KRW-BTC", 100.0)
                .build()
                .unwrap(),
        );
        let cfg = StrategyFileConfig::parse(
            r#"
            [[strategy]]
            type = "rsi_reversal"
            name = "tick"
            instrument = "KRW-BTC"
            term = "scalping"
            volume = 1.0
            "#,
        )
        .unwrap();
        let strategy = StrategyRegistry::from_config(&cfg).unwrap().into_strategies().remove(0).strategy;
        (Arc::new(StrategyEngine::new(exchange.clone(), strategy, "paper")), exchange)
    }

    #[tokio::test]
    async fn commands_walk_the_state_machine() {
        let (engine, _) = engine();
        let (scheduler, handle) = Scheduler::new(vec![engine], Duration::from_millis(10));
        tokio::spawn(scheduler.run());

        assert_eq!(handle.state().await, EngineState::Stopped);

        // Resume only applies to a paused scheduler.
        handle.send(EngineCommand::Resume).await;
        handle.send(EngineCommand::Start).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Running);

        handle.send(EngineCommand::Pause).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Paused);

        handle.send(EngineCommand::Resume).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Running);

        handle.send(EngineCommand::Stop).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Stopped);
    }

    #[tokio::test]
    async fn running_scheduler_drives_cycles_and_pause_halts_them() {
        let (engine, exchange) = engine();
        let (scheduler, handle) = Scheduler::new(vec![engine], Duration::from_millis(10));
        tokio::spawn(scheduler.run());

        handle.send(EngineCommand::Start).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(exchange.snapshots_served() >= 2);

        handle.send(EngineCommand::Pause).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let paused_at = exchange.snapshots_served();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(exchange.snapshots_served(), paused_at);

        handle.send(EngineCommand::Stop).await;
    }

    #[tokio::test]
    async fn dropping_every_handle_ends_the_scheduler() {
        let (engine, exchange) = engine();
        let (scheduler, handle) = Scheduler::new(vec![engine], Duration::from_millis(10));
        let task = tokio::spawn(scheduler.run());

        handle.send(EngineCommand::Start).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler should exit once its handles are gone")
            .unwrap();

        // Tick tasks were aborted on the way out.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let served = exchange.snapshots_served();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(exchange.snapshots_served(), served);
    }
}
