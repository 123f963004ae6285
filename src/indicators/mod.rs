// Technical indicators module
// EMA and ATR series shared by the batch and live paths

pub mod atr;
pub mod moving_average;

pub use atr::{atr, true_range_series};
pub use moving_average::ema;

use serde::{Deserialize, Serialize};

use crate::models::{Bar, IndicatorSnapshot};

/// Indicator series aligned index-for-index with a bar sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub ema_fast: Vec<Option<f64>>,
    pub ema_slow: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
}

impl IndicatorSet {
    /// Compute every series over `bars` in full
    pub fn compute(bars: &[Bar], ema_fast_period: usize, ema_slow_period: usize, atr_period: usize) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        Self {
            ema_fast: ema(&closes, ema_fast_period),
            ema_slow: ema(&closes, ema_slow_period),
            atr: atr(bars, atr_period),
        }
    }

    pub fn len(&self) -> usize {
        self.ema_fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ema_fast.is_empty()
    }

    /// Values at `index`; out-of-range indices read as undefined
    pub fn snapshot(&self, index: usize) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: self.ema_fast.get(index).copied().flatten(),
            ema_slow: self.ema_slow.get(index).copied().flatten(),
            atr: self.atr.get(index).copied().flatten(),
        }
    }
}
