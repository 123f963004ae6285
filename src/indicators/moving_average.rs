/// Exponential Moving Average series, SMA-seeded
///
/// Output is aligned with `values`. Entries before `period - 1` are `None`,
/// the entry at `period - 1` is the simple average of the first `period`
/// values, and every later entry applies `k = 2 / (period + 1)`.
///
/// Returns an all-`None` series when `period == 0` or there is not enough data.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return series;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Seed with SMA
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    series[period - 1] = Some(seed);

    let mut prev = seed;
    for (i, value) in values.iter().enumerate().skip(period) {
        prev = value * multiplier + prev * (1.0 - multiplier);
        series[i] = Some(prev);
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ema_seed_is_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let series = ema(&prices, 5);

        assert_eq!(series.len(), 6);
        assert!(series[..4].iter().all(|v| v.is_none()));
        assert_eq!(series[4], Some(104.0));

        // k = 1/3
        let expected = 110.0 / 3.0 + 104.0 * 2.0 / 3.0;
        assert!((series[5].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ema_insufficient_data() {
        let series = ema(&[100.0, 102.0], 5);
        assert_eq!(series, vec![None, None]);
    }

    #[test]
    fn test_ema_zero_period() {
        let series = ema(&[1.0, 2.0, 3.0], 0);
        assert!(series.iter().all(|v| v.is_none()));
    }

    proptest! {
        #[test]
        fn prop_ema_constant_series_converges(price in 0.01f64..100_000.0, period in 1usize..50, extra in 0usize..100) {
            let values = vec![price; period + extra];
            let series = ema(&values, period);

            for value in series.iter().skip(period - 1) {
                let v = value.expect("defined after warm-up");
                prop_assert!((v - price).abs() <= price * 1e-9);
            }
        }

        #[test]
        fn prop_ema_warmup_contract(values in prop::collection::vec(1.0f64..1_000.0, 0..200), period in 1usize..60) {
            let series = ema(&values, period);

            prop_assert_eq!(series.len(), values.len());
            for (i, value) in series.iter().enumerate() {
                if i + 1 < period {
                    prop_assert!(value.is_none());
                } else {
                    prop_assert!(value.is_some());
                }
            }
        }
    }
}
