use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Trading window in reference-timezone hours
///
/// `start == end` means no filter, `start < end` is a same-day window
/// `[start, end)` and `start > end` wraps over midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl SessionWindow {
    pub fn all_day() -> Self {
        Self {
            start_hour: 0,
            end_hour: 0,
        }
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            return true;
        }
        if self.start_hour < self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>, tz: Tz) -> bool {
        self.contains_hour(hour_in(instant, tz))
    }
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self::all_day()
    }
}

/// Calendar date of `instant` in the reference timezone
pub fn trading_day(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Hour of day of `instant` in the reference timezone
pub fn hour_in(instant: DateTime<Utc>, tz: Tz) -> u32 {
    instant.with_timezone(&tz).hour()
}

/// UTC instant of local midnight starting `date`
///
/// Falls back to the earliest valid local time when midnight is skipped by a
/// DST transition.
pub fn trading_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => {
            // Midnight does not exist locally; first valid instant is one hour later
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// UTC instant at which the session of `date` starts qualifying for entries
pub fn qualifying_start(date: NaiveDate, tz: Tz, qualifying_hour: u32) -> DateTime<Utc> {
    let naive = date
        .and_hms_opt(qualifying_hour.min(23), 0, 0)
        .unwrap_or_default();
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| trading_midnight(date, tz) + Duration::hours(qualifying_hour as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    #[test]
    fn test_all_day_window() {
        let window = SessionWindow::all_day();
        assert!((0..24).all(|h| window.contains_hour(h)));
    }

    #[test]
    fn test_same_day_window() {
        let window = SessionWindow {
            start_hour: 9,
            end_hour: 16,
        };
        assert!(!window.contains_hour(8));
        assert!(window.contains_hour(9));
        assert!(window.contains_hour(15));
        assert!(!window.contains_hour(16));
    }

    #[test]
    fn test_overnight_window() {
        let window = SessionWindow {
            start_hour: 22,
            end_hour: 3,
        };
        assert!(window.contains_hour(23));
        assert!(window.contains_hour(0));
        assert!(window.contains_hour(2));
        assert!(!window.contains_hour(3));
        assert!(!window.contains_hour(12));
    }

    #[test]
    fn test_trading_day_in_reference_zone() {
        // 03:00 UTC is still the previous evening in New York
        let instant = Utc.with_ymd_and_hms(2024, 1, 3, 3, 0, 0).unwrap();
        assert_eq!(
            trading_day(instant, New_York),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(hour_in(instant, New_York), 22);
    }

    #[test]
    fn test_midnight_and_qualifying_start() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            trading_midnight(date, New_York),
            Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap()
        );
        assert_eq!(
            qualifying_start(date, New_York, 4),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );

        // Summer time shifts the offset
        let summer = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            trading_midnight(summer, New_York),
            Utc.with_ymd_and_hms(2024, 7, 1, 4, 0, 0).unwrap()
        );
    }
}
