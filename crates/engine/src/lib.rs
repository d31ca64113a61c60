pub mod cycle;
pub mod scheduler;
pub mod upbit;

pub use cycle::{CycleReport, StrategyEngine};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use upbit::{KeyResolver, StaticKeyResolver, UpbitClient};
