use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::TrendbotError;
use crate::models::{Bar, Interval};
use crate::Result;

/// Source of closed bars for the live engine
///
/// Network clients, retries and pagination live behind this trait; the
/// engine only sees ordered bars or an error.
pub trait MarketData: Send + Sync {
    /// Closed bars with `start <= open_time < end`, ordered by open time
    fn get_bars(
        &self,
        instrument: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    /// Most recent closed bar, if any
    fn get_latest_closed_bar(&self, instrument: &str, interval: Interval) -> Result<Option<Bar>>;
}

/// In-memory feed that replays a recorded bar sequence
///
/// Every call to `get_latest_closed_bar` advances the replay clock by one
/// bar. Range queries see the whole recording.
pub struct ReplayFeed {
    instrument: String,
    interval: Interval,
    bars: Vec<Bar>,
    cursor: Mutex<usize>,
}

impl ReplayFeed {
    pub fn new(instrument: impl Into<String>, interval: Interval, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.open_time);
        Self {
            instrument: instrument.into(),
            interval,
            bars,
            cursor: Mutex::new(0),
        }
    }

    /// Bars not yet handed out by `get_latest_closed_bar`
    pub fn remaining(&self) -> usize {
        let cursor = self.cursor.lock().map(|c| *c).unwrap_or(self.bars.len());
        self.bars.len().saturating_sub(cursor)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    fn check_stream(&self, instrument: &str, interval: Interval) -> Result<()> {
        if instrument != self.instrument || interval != self.interval {
            return Err(TrendbotError::MarketData(format!(
                "no recording for {} {} (have {} {})",
                instrument, interval, self.instrument, self.interval
            )));
        }
        Ok(())
    }
}

impl MarketData for ReplayFeed {
    fn get_bars(
        &self,
        instrument: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        self.check_stream(instrument, interval)?;
        Ok(self
            .bars
            .iter()
            .filter(|b| b.open_time >= start && b.open_time < end)
            .copied()
            .collect())
    }

    fn get_latest_closed_bar(&self, instrument: &str, interval: Interval) -> Result<Option<Bar>> {
        self.check_stream(instrument, interval)?;
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|e| TrendbotError::MarketData(format!("replay cursor poisoned: {}", e)))?;

        match self.bars.get(*cursor) {
            Some(bar) => {
                *cursor += 1;
                Ok(Some(*bar))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn create_test_bars(count: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let price = 100.0 + i as f64;
                Bar::new(
                    start + Duration::minutes(5 * i as i64),
                    Interval::FiveMinutes,
                    price,
                    price + 1.0,
                    price - 1.0,
                    price + 0.5,
                    10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_range_query_is_half_open() {
        let bars = create_test_bars(10);
        let feed = ReplayFeed::new("BTCUSDT", Interval::FiveMinutes, bars.clone());

        let window = feed
            .get_bars("BTCUSDT", Interval::FiveMinutes, bars[2].open_time, bars[5].open_time)
            .unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0], bars[2]);
        assert_eq!(window[2], bars[4]);
    }

    #[test]
    fn test_latest_bar_advances() {
        let bars = create_test_bars(2);
        let feed = ReplayFeed::new("BTCUSDT", Interval::FiveMinutes, bars.clone());

        assert_eq!(feed.remaining(), 2);
        let first = feed.get_latest_closed_bar("BTCUSDT", Interval::FiveMinutes).unwrap();
        assert_eq!(first, Some(bars[0]));
        let second = feed.get_latest_closed_bar("BTCUSDT", Interval::FiveMinutes).unwrap();
        assert_eq!(second, Some(bars[1]));
        assert!(feed
            .get_latest_closed_bar("BTCUSDT", Interval::FiveMinutes)
            .unwrap()
            .is_none());
        assert_eq!(feed.remaining(), 0);
    }

    #[test]
    fn test_unknown_stream_is_an_error() {
        let feed = ReplayFeed::new("BTCUSDT", Interval::FiveMinutes, create_test_bars(3));
        let err = feed
            .get_latest_closed_bar("ETHUSDT", Interval::FiveMinutes)
            .unwrap_err();
        assert!(matches!(err, TrendbotError::MarketData(_)));
    }
}
