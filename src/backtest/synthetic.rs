use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::models::{Bar, Interval};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
    /// Rising trend with regular retracements through the fast average
    TrendWithPullbacks,
}

impl std::str::FromStr for MarketScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uptrend" => Ok(MarketScenario::Uptrend),
            "downtrend" => Ok(MarketScenario::Downtrend),
            "sideways" => Ok(MarketScenario::Sideways),
            "volatile" => Ok(MarketScenario::Volatile),
            "pullbacks" | "trend_with_pullbacks" => Ok(MarketScenario::TrendWithPullbacks),
            other => Err(format!("unknown scenario `{}`", other)),
        }
    }
}

/// Generates synthetic bars for backtests and replays
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start_time: DateTime<Utc>,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    ///
    /// Bars start at 2024-01-02 05:00 UTC (New York midnight) unless
    /// `starting_at` says otherwise.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000_000.0,
            start_time: Utc
                .with_ymd_and_hms(2024, 1, 2, 5, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    pub fn starting_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Generate bars for a specific market scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_bars` - Number of bars to generate (500+ covers the slow EMA warm-up)
    /// * `interval` - Bar interval
    pub fn generate(&mut self, scenario: MarketScenario, num_bars: usize, interval: Interval) -> Vec<Bar> {
        let mut bars = Vec::with_capacity(num_bars);
        let mut current_price = self.base_price;
        let bars_per_day = 24.0 * 60.0 / interval.minutes() as f64;

        for i in 0..num_bars {
            let open_time = self.start_time + interval.duration() * i as i32;
            let previous = current_price;

            current_price = match scenario {
                MarketScenario::Uptrend | MarketScenario::Downtrend => {
                    let daily = if scenario == MarketScenario::Uptrend { 0.02 } else { -0.02 };
                    // Reduced noise so the trend is dominant
                    let drift = current_price * daily / bars_per_day;
                    let noise = current_price * self.rng.gen_range(-0.001..0.001);
                    current_price + drift + noise
                }
                MarketScenario::Sideways => {
                    // Mean reversion force + noise
                    let reversion = (self.base_price - current_price) * 0.1;
                    let noise = current_price * self.rng.gen_range(-0.01..0.01);
                    current_price + reversion + noise
                }
                MarketScenario::Volatile => {
                    let change = current_price * self.rng.gen_range(-0.05..0.05);
                    // Prevent price from going too low
                    (current_price + change).max(self.base_price * 0.5)
                }
                MarketScenario::TrendWithPullbacks => {
                    let wave = 1.5 * (2.0 * PI * i as f64 / 60.0).sin();
                    let noise = self.rng.gen_range(-0.03..0.03);
                    self.base_price + 0.03 * i as f64 + wave + noise
                }
            };

            bars.push(self.create_bar(previous, current_price, open_time, interval));
        }

        bars
    }

    /// Helper to create a bar from the previous and current close
    fn create_bar(&mut self, previous: f64, close: f64, open_time: DateTime<Utc>, interval: Interval) -> Bar {
        // Intrabar wicks of up to 0.2%
        let noise_pct = 0.002;
        let open = previous;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..noise_pct));

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Bar::new(open_time, interval, open, high, low, close, volume)
    }
}
