use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::session::SessionWindow;
use crate::error::TrendbotError;
use crate::Result;

/// Which structure detector drives entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureVariant {
    #[default]
    Pullback,
    RangeBreak,
}

/// Hysteresis band between the fast and slow averages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendBand {
    /// Band is this fraction of the slow average
    PriceFraction(f64),
    /// Band is this multiple of ATR
    Atr(f64),
}

impl Default for TrendBand {
    fn default() -> Self {
        TrendBand::PriceFraction(0.0002)
    }
}

/// Thresholds for the trend/pullback detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullbackParams {
    pub reward_multiple: f64,
    pub trend_band: TrendBand,
    pub min_trend_bars: usize,
    /// Minimum |ema_fast - ema_slow| in price units on the entry bar
    pub min_trend_gap: f64,
    pub min_pullback_bars: usize,
    pub max_pullback_bars: usize,
    pub min_pullback_depth_atr: f64,
    pub max_pullback_depth_atr: f64,
    pub max_entry_distance_from_ema_atr: f64,
    /// 0 = unlimited
    pub max_pullbacks_per_trend: usize,
    pub atr_buffer_mult: f64,
    pub touch_tolerance_atr: f64,
}

impl Default for PullbackParams {
    fn default() -> Self {
        Self::preset(FilterMode::Light, RiskProfile::Moderate)
    }
}

impl PullbackParams {
    /// Parameter presets offered to users
    ///
    /// The filter mode only sets the trend-strength gap. `None` and `Light`
    /// both leave it disabled.
    pub fn preset(filter: FilterMode, risk: RiskProfile) -> Self {
        let min_trend_gap = match filter {
            FilterMode::None | FilterMode::Light => 0.0,
            FilterMode::Pro => 15.0,
        };

        Self {
            reward_multiple: risk.reward_multiple(),
            trend_band: TrendBand::default(),
            min_trend_bars: 0,
            min_trend_gap,
            min_pullback_bars: 1,
            max_pullback_bars: 12,
            min_pullback_depth_atr: 0.0,
            max_pullback_depth_atr: 3.0,
            max_entry_distance_from_ema_atr: 0.5,
            max_pullbacks_per_trend: 0,
            atr_buffer_mult: 0.2,
            touch_tolerance_atr: 0.2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.reward_multiple > 0.0) {
            return Err(TrendbotError::invalid_config(
                "reward_multiple",
                format!("must be positive, got {}", self.reward_multiple),
            ));
        }
        match self.trend_band {
            TrendBand::PriceFraction(f) | TrendBand::Atr(f) if f < 0.0 || !f.is_finite() => {
                return Err(TrendbotError::invalid_config(
                    "trend_band",
                    format!("must be a non-negative finite value, got {}", f),
                ));
            }
            _ => {}
        }
        if self.min_pullback_bars == 0 {
            return Err(TrendbotError::invalid_config(
                "min_pullback_bars",
                "must be at least 1",
            ));
        }
        if self.min_pullback_bars > self.max_pullback_bars {
            return Err(TrendbotError::invalid_config(
                "max_pullback_bars",
                format!(
                    "must be >= min_pullback_bars ({} < {})",
                    self.max_pullback_bars, self.min_pullback_bars
                ),
            ));
        }
        if self.min_pullback_depth_atr < 0.0
            || self.min_pullback_depth_atr > self.max_pullback_depth_atr
        {
            return Err(TrendbotError::invalid_config(
                "max_pullback_depth_atr",
                format!(
                    "depth bounds must satisfy 0 <= min <= max, got [{}, {}]",
                    self.min_pullback_depth_atr, self.max_pullback_depth_atr
                ),
            ));
        }
        for (field, value) in [
            ("min_trend_gap", self.min_trend_gap),
            ("max_entry_distance_from_ema_atr", self.max_entry_distance_from_ema_atr),
            ("atr_buffer_mult", self.atr_buffer_mult),
            ("touch_tolerance_atr", self.touch_tolerance_atr),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(TrendbotError::invalid_config(
                    field,
                    format!("must be non-negative, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

/// Thresholds for the range break/re-entry detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeBreakParams {
    pub reward_multiple: f64,
}

impl Default for RangeBreakParams {
    fn default() -> Self {
        Self {
            reward_multiple: 2.0,
        }
    }
}

/// Session boundaries in the reference timezone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timezone: Tz,
    /// Local hour at which an episode starts accepting entries. For the
    /// range-break variant the bars before it define the range.
    pub qualifying_hour: u32,
    /// Entries only when the trigger bar closes inside this window
    pub trade_window: SessionWindow,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            qualifying_hour: 4,
            trade_window: SessionWindow::all_day(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.qualifying_hour > 23 {
            return Err(TrendbotError::invalid_config(
                "qualifying_hour",
                format!("must be < 24, got {}", self.qualifying_hour),
            ));
        }
        if self.trade_window.start_hour > 23 || self.trade_window.end_hour > 23 {
            return Err(TrendbotError::invalid_config(
                "trade_window",
                format!(
                    "hours must be < 24, got {}..{}",
                    self.trade_window.start_hour, self.trade_window.end_hour
                ),
            ));
        }
        Ok(())
    }
}

/// Exit policy shared by the simulator and live positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// 0 = hold until stop, target or end of data
    pub max_hold_bars: usize,
    /// Timed exits with |R| inside this band count as breakeven
    pub breakeven_band_r: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            max_hold_bars: 0,
            breakeven_band_r: 0.05,
        }
    }
}

/// Full parameter set for one batch run or one live engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub variant: StructureVariant,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub atr_period: usize,
    pub pullback: PullbackParams,
    pub range_break: RangeBreakParams,
    pub session: SessionConfig,
    pub simulation: SimulationParams,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            variant: StructureVariant::Pullback,
            ema_fast_period: 21,
            ema_slow_period: 200,
            atr_period: 14,
            pullback: PullbackParams::default(),
            range_break: RangeBreakParams::default(),
            session: SessionConfig::default(),
            simulation: SimulationParams::default(),
        }
    }
}

impl StrategyParams {
    /// Reject parameter combinations that would produce misleading runs
    pub fn validate(&self) -> Result<()> {
        if self.ema_fast_period == 0 {
            return Err(TrendbotError::invalid_config(
                "ema_fast_period",
                "must be at least 1",
            ));
        }
        if self.ema_fast_period >= self.ema_slow_period {
            return Err(TrendbotError::invalid_config(
                "ema_fast_period",
                format!(
                    "must be less than ema_slow_period ({} >= {})",
                    self.ema_fast_period, self.ema_slow_period
                ),
            ));
        }
        if self.atr_period == 0 {
            return Err(TrendbotError::invalid_config("atr_period", "must be at least 1"));
        }
        if !(self.range_break.reward_multiple > 0.0) {
            return Err(TrendbotError::invalid_config(
                "range_break.reward_multiple",
                format!("must be positive, got {}", self.range_break.reward_multiple),
            ));
        }
        if self.simulation.breakeven_band_r < 0.0 {
            return Err(TrendbotError::invalid_config(
                "breakeven_band_r",
                format!("must be non-negative, got {}", self.simulation.breakeven_band_r),
            ));
        }
        self.pullback.validate()?;
        self.session.validate()?;
        Ok(())
    }

    /// Bars needed before every indicator is defined
    pub fn warmup_bars(&self) -> usize {
        self.ema_slow_period.max(self.atr_period + 1)
    }
}

/// Entry filter strictness preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    None,
    Light,
    Pro,
}

impl FromStr for FilterMode {
    type Err = TrendbotError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FilterMode::None),
            "light" => Ok(FilterMode::Light),
            "pro" => Ok(FilterMode::Pro),
            other => Err(TrendbotError::invalid_config(
                "filter_mode",
                format!("unknown filter mode `{}`", other),
            )),
        }
    }
}

/// Reward multiple preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Loose,
    Moderate,
    Strict,
}

impl RiskProfile {
    pub fn reward_multiple(&self) -> f64 {
        match self {
            RiskProfile::Loose => 1.8,
            RiskProfile::Moderate => 2.2,
            RiskProfile::Strict => 2.5,
        }
    }
}

impl FromStr for RiskProfile {
    type Err = TrendbotError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loose" => Ok(RiskProfile::Loose),
            "moderate" | "default" => Ok(RiskProfile::Moderate),
            "strict" => Ok(RiskProfile::Strict),
            other => Err(TrendbotError::invalid_config(
                "risk_profile",
                format!("unknown risk profile `{}`", other),
            )),
        }
    }
}
