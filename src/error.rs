use chrono::{DateTime, Utc};

/// Errors surfaced by the decision core.
///
/// Insufficient data and degenerate signals are not errors: indicator
/// functions return undefined entries and bad signals are dropped at
/// creation. Everything here rejects a run or a bar outright.
#[derive(Debug, thiserror::Error)]
pub enum TrendbotError {
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("unsupported interval: {0}")]
    UnsupportedInterval(String),

    #[error("bar {index} is not after the previous bar ({current} <= {previous})")]
    NonMonotonicBars {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: String },

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("live engine lock poisoned: {0}")]
    EngineLock(String),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl TrendbotError {
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
