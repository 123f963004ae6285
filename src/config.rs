use serde::{Deserialize, Serialize};

use crate::error::TrendbotError;
use crate::models::Interval;
use crate::strategy::StrategyParams;
use crate::Result;

/// Live polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub instrument: String,
    pub interval: Interval,
    pub poll_interval_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            instrument: "BTCUSDT".to_string(),
            interval: Interval::FiveMinutes,
            poll_interval_secs: 10,
        }
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.instrument.trim().is_empty() {
            return Err(TrendbotError::invalid_config("live.instrument", "must not be empty"));
        }
        if self.poll_interval_secs == 0 {
            return Err(TrendbotError::invalid_config(
                "live.poll_interval_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub params: StrategyParams,
    pub live: LiveConfig,
}

impl AppConfig {
    /// Load configuration
    ///
    /// Layers, lowest priority first: built-in defaults, the TOML file at
    /// `path` (or an optional `trendbot.toml` in the working directory), then
    /// `TRENDBOT__`-prefixed environment variables such as
    /// `TRENDBOT__PARAMS__EMA_FAST_PERIOD=34`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path),
            None => config::File::with_name("trendbot").required(false),
        };

        let config: AppConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("TRENDBOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.live.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StructureVariant;
    use std::io::Write;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let path = write_config(
            "trendbot-load",
            r#"
[params]
variant = "range_break"
ema_fast_period = 34

[params.session]
timezone = "Europe/London"
qualifying_hour = 8

[params.range_break]
reward_multiple = 1.5

[live]
instrument = "ETHUSDT"
interval = "15m"
"#,
        );

        let config = AppConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.params.variant, StructureVariant::RangeBreak);
        assert_eq!(config.params.ema_fast_period, 34);
        assert_eq!(config.params.ema_slow_period, 200);
        assert_eq!(config.params.session.timezone, chrono_tz::Europe::London);
        assert_eq!(config.params.session.qualifying_hour, 8);
        assert_eq!(config.params.range_break.reward_multiple, 1.5);
        assert_eq!(config.live.instrument, "ETHUSDT");
        assert_eq!(config.live.interval, Interval::FifteenMinutes);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let path = write_config(
            "trendbot-invalid",
            r#"
[params]
ema_fast_period = 300
"#,
        );

        let result = AppConfig::load(path.to_str());
        std::fs::remove_file(&path).ok();

        assert!(matches!(
            result,
            Err(TrendbotError::InvalidConfig {
                field: "ema_fast_period",
                ..
            })
        ));
    }

    #[test]
    fn test_unsupported_interval_in_file() {
        let path = write_config(
            "trendbot-interval",
            r#"
[live]
interval = "7m"
"#,
        );

        let result = AppConfig::load(path.to_str());
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(TrendbotError::Config(_))));
    }
}
