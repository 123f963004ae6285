// Live execution module
pub mod candle_watcher;
pub mod live_engine;
pub mod market_data;
pub mod position;

pub use candle_watcher::{CandleWatcher, StopHandle, WatcherStats};
pub use live_engine::{EpisodeSnapshot, LiveEngine};
pub use market_data::{MarketData, ReplayFeed};
pub use position::{LivePosition, PositionStatus};
