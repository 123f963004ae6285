pub mod validator;

use chrono::{DateTime, NaiveDate, Utc};

use crate::execution::MarketData;
use crate::models::{Bar, Interval};
use crate::strategy::session::{qualifying_start, trading_midnight};
use crate::strategy::{PriceRange, SessionConfig};
use crate::Result;

pub use validator::BarValidator;

/// Statistics from a session backfill
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillStats {
    pub fetched_bars: usize,
    pub range_bars: usize,
    pub history_bars: usize,
    pub validation_failures: usize,
}

/// Episode state rebuilt from the market-data collaborator
#[derive(Debug, Clone)]
pub struct SessionBackfill {
    /// Opening range, when requested and available
    pub range: Option<PriceRange>,
    /// Bars from the qualifying start up to (excluding) the requested end
    pub history: Vec<Bar>,
    pub stats: BackfillStats,
}

/// Fetch the opening range and the tradable history of one trading day
///
/// # Arguments
/// * `day` - Trading day in the reference timezone
/// * `until` - Exclusive end of the history window (the bar being processed)
/// * `with_range` - Also fetch `[midnight, qualifying start)` and build a range
pub fn backfill_session(
    market_data: &dyn MarketData,
    instrument: &str,
    interval: Interval,
    session: &SessionConfig,
    day: NaiveDate,
    until: DateTime<Utc>,
    with_range: bool,
) -> Result<SessionBackfill> {
    let midnight = trading_midnight(day, session.timezone);
    let start = qualifying_start(day, session.timezone, session.qualifying_hour);
    let validator = BarValidator::new();
    let mut stats = BackfillStats::default();

    let range = if with_range {
        let fetched = market_data.get_bars(instrument, interval, midnight, start)?;
        stats.fetched_bars += fetched.len();
        let bars = clean_bars(&validator, fetched, &mut stats);
        stats.range_bars = bars.len();
        PriceRange::from_bars(&bars)
    } else {
        None
    };

    let history = if start < until {
        let fetched = market_data.get_bars(instrument, interval, start, until)?;
        stats.fetched_bars += fetched.len();
        clean_bars(&validator, fetched, &mut stats)
    } else {
        Vec::new()
    };
    stats.history_bars = history.len();

    tracing::debug!(
        "Backfilled {} {} for {}: range bars={}, history bars={}, rejected={}",
        instrument,
        interval,
        day,
        stats.range_bars,
        stats.history_bars,
        stats.validation_failures
    );

    Ok(SessionBackfill {
        range,
        history,
        stats,
    })
}

/// Drop malformed or out-of-order bars, keeping the sequence strictly increasing
fn clean_bars(validator: &BarValidator, bars: Vec<Bar>, stats: &mut BackfillStats) -> Vec<Bar> {
    let mut cleaned: Vec<Bar> = Vec::with_capacity(bars.len());

    for (index, bar) in bars.into_iter().enumerate() {
        let result = validator.validate(&bar, index).and_then(|_| match cleaned.last() {
            Some(previous) => validator.validate_order(previous, &bar, index),
            None => Ok(()),
        });

        if let Err(e) = result {
            tracing::warn!("Skipping backfilled bar at {}: {}", bar.open_time, e);
            stats.validation_failures += 1;
            continue;
        }
        cleaned.push(bar);
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ReplayFeed;
    use chrono::{Duration, TimeZone};

    fn create_hourly_day() -> Vec<Bar> {
        // New York midnight on 2024-01-02 is 05:00 UTC
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
        (0..8)
            .map(|i| {
                let price = 100.0 + i as f64;
                Bar::new(
                    start + Duration::hours(i),
                    Interval::OneHour,
                    price,
                    price + 2.0,
                    price - 1.0,
                    price + 1.0,
                    10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_backfill_splits_range_and_history() {
        let bars = create_hourly_day();
        let feed = ReplayFeed::new("BTCUSDT", Interval::OneHour, bars.clone());
        let session = SessionConfig::default();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let backfill = backfill_session(
            &feed,
            "BTCUSDT",
            Interval::OneHour,
            &session,
            day,
            bars[6].open_time,
            true,
        )
        .unwrap();

        // Range: 00:00-04:00 local, history: 04:00 and 05:00
        let range = backfill.range.unwrap();
        assert_eq!(range.bar_count, 4);
        assert_eq!(range.high, 105.0);
        assert_eq!(range.low, 99.0);
        assert_eq!(backfill.history, bars[4..6].to_vec());
        assert_eq!(backfill.stats.fetched_bars, 6);
    }

    #[test]
    fn test_backfill_skips_malformed_bars() {
        let mut bars = create_hourly_day();
        bars[5].high = 1.0;
        let feed = ReplayFeed::new("BTCUSDT", Interval::OneHour, bars.clone());
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let backfill = backfill_session(
            &feed,
            "BTCUSDT",
            Interval::OneHour,
            &SessionConfig::default(),
            day,
            bars[7].open_time,
            false,
        )
        .unwrap();

        assert!(backfill.range.is_none());
        assert_eq!(backfill.history.len(), 2);
        assert_eq!(backfill.stats.validation_failures, 1);
    }

    #[test]
    fn test_empty_window_before_qualifying_hour() {
        let bars = create_hourly_day();
        let feed = ReplayFeed::new("BTCUSDT", Interval::OneHour, bars.clone());
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let backfill = backfill_session(
            &feed,
            "BTCUSDT",
            Interval::OneHour,
            &SessionConfig::default(),
            day,
            bars[4].open_time,
            true,
        )
        .unwrap();

        assert!(backfill.history.is_empty());
        assert!(backfill.range.is_some());
    }
}
