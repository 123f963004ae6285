// Core modules
pub mod backfill;
pub mod backtest;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{run_batch, BatchReport, BatchRunner};
pub use config::{AppConfig, LiveConfig};
pub use error::TrendbotError;
pub use execution::{LiveEngine, MarketData};
pub use models::*;
pub use strategy::{StrategyParams, StructureStrategy};

// Error handling
pub type Result<T> = std::result::Result<T, TrendbotError>;
