use crate::error::TrendbotError;
use crate::models::Bar;
use crate::Result;

/// Validates OHLC bar data for sanity and ordering
pub struct BarValidator;

impl BarValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a single bar; `index` is only used for error reporting
    pub fn validate(&self, bar: &Bar, index: usize) -> Result<()> {
        self.validate_prices(bar)
            .and_then(|_| self.validate_times(bar))
            .and_then(|_| self.validate_ohlc_relationship(bar))
            .map_err(|reason| TrendbotError::MalformedBar { index, reason })
    }

    /// Validate every bar and require strictly increasing open times
    pub fn validate_series(&self, bars: &[Bar]) -> Result<()> {
        for (index, bar) in bars.iter().enumerate() {
            self.validate(bar, index)?;
            if index > 0 {
                self.validate_order(&bars[index - 1], bar, index)?;
            }
        }
        Ok(())
    }

    /// `current` must open strictly after `previous`
    pub fn validate_order(&self, previous: &Bar, current: &Bar, index: usize) -> Result<()> {
        if current.open_time <= previous.open_time {
            return Err(TrendbotError::NonMonotonicBars {
                index,
                previous: previous.open_time,
                current: current.open_time,
            });
        }
        Ok(())
    }

    /// Validate that all prices are finite and positive
    fn validate_prices(&self, bar: &Bar) -> std::result::Result<(), String> {
        for (name, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("invalid {} price: {}", name, value));
            }
        }
        // Volume can be 0.0 (quiet bars)
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(format!("invalid volume: {}", bar.volume));
        }
        Ok(())
    }

    fn validate_times(&self, bar: &Bar) -> std::result::Result<(), String> {
        if bar.close_time <= bar.open_time {
            return Err(format!(
                "close time {} is not after open time {}",
                bar.close_time, bar.open_time
            ));
        }
        Ok(())
    }

    /// Validate OHLC relationships (high >= low, etc.)
    fn validate_ohlc_relationship(&self, bar: &Bar) -> std::result::Result<(), String> {
        if bar.high < bar.low {
            return Err(format!("high ({}) is less than low ({})", bar.high, bar.low));
        }
        if bar.high < bar.open.max(bar.close) {
            return Err(format!(
                "high ({}) is below the body ({} / {})",
                bar.high, bar.open, bar.close
            ));
        }
        if bar.low > bar.open.min(bar.close) {
            return Err(format!(
                "low ({}) is above the body ({} / {})",
                bar.low, bar.open, bar.close
            ));
        }
        Ok(())
    }
}

impl Default for BarValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use chrono::{Duration, TimeZone, Utc};

    fn make_valid_bar() -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap(),
            Interval::FiveMinutes,
            100.0,
            102.0,
            99.0,
            101.0,
            1_000_000.0,
        )
    }

    #[test]
    fn test_valid_bar() {
        assert!(BarValidator::new().validate(&make_valid_bar(), 0).is_ok());
    }

    #[test]
    fn test_negative_price() {
        let mut bar = make_valid_bar();
        bar.low = -1.0;
        let err = BarValidator::new().validate(&bar, 3).unwrap_err();
        assert!(matches!(err, TrendbotError::MalformedBar { index: 3, .. }));
    }

    #[test]
    fn test_nan_price() {
        let mut bar = make_valid_bar();
        bar.close = f64::NAN;
        assert!(BarValidator::new().validate(&bar, 0).is_err());
    }

    #[test]
    fn test_high_below_body() {
        let mut bar = make_valid_bar();
        bar.high = 100.5;
        assert!(BarValidator::new().validate(&bar, 0).is_err());
    }

    #[test]
    fn test_low_above_body() {
        let mut bar = make_valid_bar();
        bar.low = 100.5;
        assert!(BarValidator::new().validate(&bar, 0).is_err());
    }

    #[test]
    fn test_zero_volume_allowed() {
        let mut bar = make_valid_bar();
        bar.volume = 0.0;
        assert!(BarValidator::new().validate(&bar, 0).is_ok());
    }

    #[test]
    fn test_series_must_be_increasing() {
        let first = make_valid_bar();
        let mut second = make_valid_bar();
        second.open_time = first.open_time + Duration::minutes(5);
        second.close_time = second.open_time + Duration::minutes(5);

        let validator = BarValidator::new();
        assert!(validator.validate_series(&[first, second]).is_ok());

        let err = validator.validate_series(&[second, first]).unwrap_err();
        assert!(matches!(err, TrendbotError::NonMonotonicBars { index: 1, .. }));

        // Duplicate open times are rejected too
        assert!(validator.validate_series(&[first, first]).is_err());
    }
}
