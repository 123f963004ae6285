pub mod metrics;
pub mod runner;
pub mod simulator;
pub mod synthetic;

pub use metrics::BacktestSummary;
pub use runner::{run_batch, BatchReport, BatchRunner};
pub use simulator::{check_exit, simulate_trade};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
