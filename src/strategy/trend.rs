use serde::{Deserialize, Serialize};

use super::params::TrendBand;
use crate::indicators::IndicatorSet;
use crate::models::Side;

/// Discrete trend label per bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    None,
}

impl Trend {
    /// Side a trade with this trend would take
    pub fn side(&self) -> Option<Side> {
        match self {
            Trend::Up => Some(Side::Long),
            Trend::Down => Some(Side::Short),
            Trend::None => None,
        }
    }
}

/// Classify one bar from its indicator values
///
/// Any undefined input yields `Trend::None`, as does an ATR band without ATR.
pub fn classify(
    ema_fast: Option<f64>,
    ema_slow: Option<f64>,
    atr: Option<f64>,
    band: TrendBand,
) -> Trend {
    let (Some(fast), Some(slow)) = (ema_fast, ema_slow) else {
        return Trend::None;
    };

    let h = match band {
        TrendBand::PriceFraction(fraction) => fraction * slow,
        TrendBand::Atr(mult) => match atr {
            Some(atr) => mult * atr,
            None => return Trend::None,
        },
    };

    if fast - slow >= h {
        Trend::Up
    } else if slow - fast >= h {
        Trend::Down
    } else {
        Trend::None
    }
}

/// Trend label for every bar of an indicator set
pub fn classify_series(indicators: &IndicatorSet, band: TrendBand) -> Vec<Trend> {
    (0..indicators.len())
        .map(|i| {
            classify(
                indicators.ema_fast[i],
                indicators.ema_slow[i],
                indicators.atr[i],
                band,
            )
        })
        .collect()
}

/// Consecutive bars carrying the same label, current bar included
pub fn trend_ages(trends: &[Trend]) -> Vec<usize> {
    let mut ages = Vec::with_capacity(trends.len());
    for (i, trend) in trends.iter().enumerate() {
        let age = match i {
            0 => 1,
            _ if trends[i - 1] == *trend => ages[i - 1] + 1,
            _ => 1,
        };
        ages.push(age);
    }
    ages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_with_price_band() {
        let band = TrendBand::PriceFraction(0.0002);
        assert_eq!(classify(Some(101.0), Some(100.0), None, band), Trend::Up);
        assert_eq!(classify(Some(99.0), Some(100.0), None, band), Trend::Down);
        // Inside the 0.02 band
        assert_eq!(classify(Some(100.01), Some(100.0), None, band), Trend::None);
    }

    #[test]
    fn test_classify_with_atr_band() {
        let band = TrendBand::Atr(0.5);
        assert_eq!(classify(Some(101.0), Some(100.0), Some(1.0), band), Trend::Up);
        assert_eq!(classify(Some(100.4), Some(100.0), Some(1.0), band), Trend::None);
        assert_eq!(classify(Some(101.0), Some(100.0), None, band), Trend::None);
    }

    #[test]
    fn test_undefined_inputs_are_none() {
        let band = TrendBand::default();
        assert_eq!(classify(None, Some(100.0), Some(1.0), band), Trend::None);
        assert_eq!(classify(Some(100.0), None, Some(1.0), band), Trend::None);
    }

    #[test]
    fn test_trend_ages_reset_on_change() {
        let trends = [
            Trend::None,
            Trend::Up,
            Trend::Up,
            Trend::Up,
            Trend::Down,
            Trend::Down,
        ];
        assert_eq!(trend_ages(&trends), vec![1, 1, 2, 3, 1, 2]);
    }
}
