/// Average True Range (ATR) indicator
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The first bar has no previous close, so its true range is just High - Low.
/// ATR uses Wilder's smoothing.
use crate::models::Bar;

/// True range per bar, aligned with `bars`
pub fn true_range_series(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| match i {
            0 => bar.high - bar.low,
            _ => {
                let prev_close = bars[i - 1].close;
                (bar.high - bar.low)
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs())
            }
        })
        .collect()
}

/// Wilder ATR series aligned with `bars`
///
/// The seed is the simple average of the true ranges of bars `1..=period`
/// (the first ones with a previous close) and is placed at index `period`.
/// Earlier entries are `None`.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return series;
    }

    let true_ranges = true_range_series(bars);

    let seed: f64 = true_ranges[1..=period].iter().sum::<f64>() / period as f64;
    series[period] = Some(seed);

    let mut prev = seed;
    for i in (period + 1)..bars.len() {
        prev = (prev * (period as f64 - 1.0) + true_ranges[i]) / period as f64;
        series[i] = Some(prev);
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn create_test_bars(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| {
                Bar::new(
                    start + Duration::hours(i as i64),
                    Interval::OneHour,
                    open,
                    high,
                    low,
                    close,
                    1000.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let bars = create_test_bars(&[(100.0, 101.0, 99.0, 100.0), (104.0, 106.0, 103.0, 105.0)]);
        let tr = true_range_series(&bars);

        assert_eq!(tr[0], 2.0);
        // Gap up: high - prev close dominates
        assert_eq!(tr[1], 6.0);
    }

    #[test]
    fn test_atr_seed_placement() {
        let bars = create_test_bars(&vec![(100.0, 101.0, 99.0, 100.0); 15]);
        let series = atr(&bars, 14);

        assert!(series[..14].iter().all(|v| v.is_none()));
        assert!((series[14].unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_atr_wilder_smoothing() {
        let mut prices = vec![(100.0, 101.0, 99.0, 100.0); 4];
        prices.push((100.0, 105.0, 95.0, 100.0));
        let bars = create_test_bars(&prices);
        let series = atr(&bars, 3);

        assert_eq!(series[3], Some(2.0));
        // (2.0 * 2 + 10.0) / 3
        assert!((series[4].unwrap() - 14.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_atr_insufficient_data() {
        let bars = create_test_bars(&vec![(100.0, 101.0, 99.0, 100.0); 14]);
        assert!(atr(&bars, 14).iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_atr_high_volatility() {
        let bars = create_test_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
        ]);
        let series = atr(&bars, 5);

        assert!(series[5].unwrap() > 10.0);
    }

    proptest! {
        #[test]
        fn prop_atr_flat_series_is_zero(price in 0.01f64..10_000.0, period in 1usize..30, extra in 0usize..50) {
            let bars = create_test_bars(&vec![(price, price, price, price); period + 1 + extra]);
            let series = atr(&bars, period);

            for value in series.iter().skip(period) {
                prop_assert_eq!(*value, Some(0.0));
            }
        }
    }
}
