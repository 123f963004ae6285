use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TrendbotError;

/// One fixed-interval OHLCV sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Build a bar whose close time is derived from the interval
    /// (last millisecond of the bar, exchange style).
    pub fn new(
        open_time: DateTime<Utc>,
        interval: Interval,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            close_time: open_time + interval.duration() - Duration::milliseconds(1),
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for longs, -1 for shorts. Multiplying a price difference by this
    /// turns "favourable for the trade" into "positive".
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Price extreme that extends a swing in this direction
    pub fn with_trend_extreme(&self, bar: &Bar) -> f64 {
        match self {
            Side::Long => bar.high,
            Side::Short => bar.low,
        }
    }

    /// Price extreme that measures a retracement against this direction
    pub fn against_trend_extreme(&self, bar: &Bar) -> f64 {
        match self {
            Side::Long => bar.low,
            Side::Short => bar.high,
        }
    }

    /// True if `a` lies further in this direction than `b`
    pub fn further(&self, a: f64, b: f64) -> bool {
        self.sign() * (a - b) > 0.0
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Supported bar intervals (exchange kline notation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    EightHours,
    TwelveHours,
    OneDay,
}

impl Interval {
    pub fn minutes(&self) -> i64 {
        match self {
            Interval::OneMinute => 1,
            Interval::ThreeMinutes => 3,
            Interval::FiveMinutes => 5,
            Interval::FifteenMinutes => 15,
            Interval::ThirtyMinutes => 30,
            Interval::OneHour => 60,
            Interval::TwoHours => 120,
            Interval::FourHours => 240,
            Interval::SixHours => 360,
            Interval::EightHours => 480,
            Interval::TwelveHours => 720,
            Interval::OneDay => 1440,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
        }
    }
}

impl FromStr for Interval {
    type Err = TrendbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s.trim() {
            "1m" => Interval::OneMinute,
            "3m" => Interval::ThreeMinutes,
            "5m" => Interval::FiveMinutes,
            "15m" => Interval::FifteenMinutes,
            "30m" => Interval::ThirtyMinutes,
            "1h" => Interval::OneHour,
            "2h" => Interval::TwoHours,
            "4h" => Interval::FourHours,
            "6h" => Interval::SixHours,
            "8h" => Interval::EightHours,
            "12h" => Interval::TwelveHours,
            "1d" => Interval::OneDay,
            other => return Err(TrendbotError::UnsupportedInterval(other.to_string())),
        };
        Ok(interval)
    }
}

impl TryFrom<String> for Interval {
    type Error = TrendbotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.as_str().to_string()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator values at the bar a signal was created on
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub atr: Option<f64>,
}

/// A qualified entry produced by a structure detector.
///
/// `bar_index` is the trigger bar within the sequence the detector ran on and
/// `time` is that bar's open time, which identifies the signal across
/// re-evaluations of a growing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub bar_index: usize,
    pub time: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub risk: f64,
    pub reward_multiple: f64,
    pub indicators: IndicatorSnapshot,
}

impl EntrySignal {
    /// Same signal shifted to a different index base
    pub fn offset(mut self, by: usize) -> Self {
        self.bar_index += by;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHold,
    EndOfData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Breakeven,
    Timeout,
}

impl Outcome {
    /// Outcome of an exit that did not touch stop or target
    pub fn for_timed_exit(r_multiple: f64, breakeven_band_r: f64) -> Self {
        if r_multiple.abs() <= breakeven_band_r {
            Outcome::Breakeven
        } else {
            Outcome::Timeout
        }
    }
}

/// Resolved trade from the simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub signal: EntrySignal,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub outcome: Outcome,
    pub r_multiple: f64,
}
