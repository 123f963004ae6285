use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::params::RangeBreakParams;
use super::{StructureState, StructureStrategy};
use crate::indicators::IndicatorSet;
use crate::models::{Bar, EntrySignal, Side};

/// Reference price band built from the opening bars of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub high: f64,
    pub low: f64,
    pub bar_count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PriceRange {
    /// Range covering `bars`, or `None` when there are none
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;
        let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        Some(Self {
            high,
            low,
            bar_count: bars.len(),
            start: first.open_time,
            end: last.close_time,
        })
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Which side of the range price last broke out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSide {
    Above,
    Below,
}

/// Break/re-entry progress after the last scanned bar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBreakState {
    pub current_side: Option<RangeSide>,
    pub last_exit: Option<usize>,
    pub last_reentry: Option<usize>,
}

impl RangeBreakState {
    pub fn waiting_for_breakout(&self) -> bool {
        self.current_side.is_none()
    }

    pub fn waiting_for_reentry(&self) -> bool {
        self.current_side.is_some()
    }
}

/// Break-out / re-entry detector over a fixed range
///
/// A bar whose body straddles a boundary and closes outside opens an exit
/// event. A later bar straddling the same boundary back and closing inside
/// the range is the re-entry; the trade fades the exit on the next bar's open.
#[derive(Debug, Clone)]
pub struct RangeBreakStrategy {
    range: PriceRange,
    params: RangeBreakParams,
}

impl RangeBreakStrategy {
    pub fn new(range: PriceRange, params: RangeBreakParams) -> Self {
        Self { range, params }
    }

    pub fn range(&self) -> &PriceRange {
        &self.range
    }

    pub fn scan(&self, bars: &[Bar], indicators: &IndicatorSet) -> (Vec<EntrySignal>, RangeBreakState) {
        let (high, low) = (self.range.high, self.range.low);
        let mut state = RangeBreakState::default();
        let mut signals = Vec::new();

        for (i, bar) in bars.iter().enumerate() {
            // A bar opening or closing exactly on a boundary does not straddle it
            let exit_up = bar.open < high && bar.close > high;
            let exit_down = bar.open > low && bar.close < low;

            match (state.current_side, state.last_exit) {
                (Some(side), Some(exit)) => {
                    let reentered = match side {
                        RangeSide::Above => bar.open > high && bar.close < high,
                        RangeSide::Below => bar.open < low && bar.close > low,
                    } && self.range.contains(bar.close);

                    if reentered {
                        state.current_side = None;
                        state.last_reentry = Some(i);
                        if let Some(signal) = self.build_signal(bars, exit, i, side, indicators) {
                            signals.push(signal);
                        }
                    } else if exit_up {
                        // A newer exit replaces the pending one
                        state.current_side = Some(RangeSide::Above);
                        state.last_exit = Some(i);
                    } else if exit_down || bar.close < low {
                        state.current_side = Some(RangeSide::Below);
                        state.last_exit = Some(i);
                    } else if side == RangeSide::Below && bar.close > high {
                        state.current_side = Some(RangeSide::Above);
                        state.last_exit = Some(i);
                    } else if self.range.contains(bar.close) {
                        // Drifted back inside without a clean re-entry
                        state.current_side = None;
                    }
                }
                _ => {
                    if exit_up {
                        state.current_side = Some(RangeSide::Above);
                        state.last_exit = Some(i);
                    } else if exit_down {
                        state.current_side = Some(RangeSide::Below);
                        state.last_exit = Some(i);
                    }
                }
            }
        }

        (signals, state)
    }

    fn build_signal(
        &self,
        bars: &[Bar],
        exit: usize,
        reentry: usize,
        broke: RangeSide,
        indicators: &IndicatorSet,
    ) -> Option<EntrySignal> {
        // Entry needs the next bar's open
        let entry_bar = bars.get(reentry + 1)?;
        let window = &bars[exit..=reentry];

        let (side, stop) = match broke {
            RangeSide::Above => (
                Side::Short,
                window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
            ),
            RangeSide::Below => (
                Side::Long,
                window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
            ),
        };

        let entry = entry_bar.open;
        let risk = side.sign() * (entry - stop);
        if !(risk > 0.0) {
            tracing::debug!(
                "re-entry at bar {}: stop {:.4} not beyond entry {:.4}, signal dropped",
                reentry,
                stop,
                entry
            );
            return None;
        }

        tracing::debug!(
            "range re-entry: exit bar {}, re-entry bar {}, {} @ {:.4}",
            exit,
            reentry,
            side,
            entry
        );

        Some(EntrySignal {
            bar_index: reentry + 1,
            time: entry_bar.open_time,
            side,
            entry_price: entry,
            stop_price: stop,
            target_price: entry + side.sign() * self.params.reward_multiple * risk,
            risk,
            reward_multiple: self.params.reward_multiple,
            indicators: indicators.snapshot(reentry + 1),
        })
    }
}

impl StructureStrategy for RangeBreakStrategy {
    fn name(&self) -> &str {
        "range_break"
    }

    fn detect_signals(&self, bars: &[Bar], indicators: &IndicatorSet) -> Vec<EntrySignal> {
        self.scan(bars, indicators).0
    }

    fn structure_state(&self, bars: &[Bar], indicators: &IndicatorSet) -> StructureState {
        StructureState::RangeBreak(self.scan(bars, indicators).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use chrono::{Duration, TimeZone};

    fn create_test_bars(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| {
                Bar::new(
                    start + Duration::minutes(5 * i as i64),
                    Interval::FiveMinutes,
                    open,
                    high,
                    low,
                    close,
                    1000.0,
                )
            })
            .collect()
    }

    fn range_100_110() -> PriceRange {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap();
        PriceRange {
            high: 110.0,
            low: 100.0,
            bar_count: 48,
            start,
            end: start + Duration::hours(4),
        }
    }

    fn detect(bars: &[Bar]) -> (Vec<EntrySignal>, RangeBreakState) {
        let indicators = IndicatorSet::compute(bars, 21, 200, 14);
        RangeBreakStrategy::new(range_100_110(), RangeBreakParams::default()).scan(bars, &indicators)
    }

    #[test]
    fn test_range_from_bars() {
        let bars = create_test_bars(&[
            (105.0, 108.0, 101.0, 107.0),
            (107.0, 110.0, 103.0, 104.0),
            (104.0, 106.0, 100.0, 101.0),
        ]);
        let range = PriceRange::from_bars(&bars).unwrap();
        assert_eq!(range.high, 110.0);
        assert_eq!(range.low, 100.0);
        assert_eq!(range.bar_count, 3);
        assert!(PriceRange::from_bars(&[]).is_none());
    }

    #[test]
    fn test_exit_up_then_reentry_gives_short() {
        let bars = create_test_bars(&[
            (108.0, 113.0, 107.0, 112.0), // exit up
            (111.0, 111.5, 107.5, 108.0), // re-entry
            (107.5, 108.0, 106.0, 106.5), // entry bar
        ]);
        let (signals, state) = detect(&bars);

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.side, Side::Short);
        assert_eq!(signal.bar_index, 2);
        assert_eq!(signal.time, bars[2].open_time);
        assert_eq!(signal.entry_price, 107.5);
        assert_eq!(signal.stop_price, 113.0);
        assert_eq!(signal.risk, 5.5);
        assert_eq!(signal.target_price, 96.5);

        assert!(state.waiting_for_breakout());
        assert_eq!(state.last_exit, Some(0));
        assert_eq!(state.last_reentry, Some(1));
    }

    #[test]
    fn test_exit_down_then_reentry_gives_long() {
        let bars = create_test_bars(&[
            (102.0, 102.5, 97.0, 98.0),
            (99.0, 103.0, 96.5, 102.0),
            (102.5, 104.0, 101.0, 103.0),
        ]);
        let (signals, _) = detect(&bars);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Long);
        assert_eq!(signals[0].stop_price, 96.5);
        assert_eq!(signals[0].entry_price, 102.5);
        assert_eq!(signals[0].target_price, 102.5 + 2.0 * 6.0);
    }

    #[test]
    fn test_reentry_on_last_bar_waits_for_entry_bar() {
        let bars = create_test_bars(&[(108.0, 113.0, 107.0, 112.0), (111.0, 111.5, 107.5, 108.0)]);
        let (signals, state) = detect(&bars);

        assert!(signals.is_empty());
        assert_eq!(state.last_reentry, Some(1));
    }

    #[test]
    fn test_waiting_for_reentry_while_outside() {
        let bars = create_test_bars(&[
            (108.0, 113.0, 107.0, 112.0),
            (112.0, 115.0, 111.0, 114.0),
        ]);
        let (signals, state) = detect(&bars);

        assert!(signals.is_empty());
        assert!(state.waiting_for_reentry());
        assert_eq!(state.current_side, Some(RangeSide::Above));
    }

    #[test]
    fn test_stop_spans_exit_to_reentry() {
        let bars = create_test_bars(&[
            (108.0, 112.5, 107.0, 112.0),
            (112.0, 116.0, 111.0, 114.0),
            (114.0, 114.5, 107.5, 109.0),
            (109.0, 109.5, 105.0, 106.0),
        ]);
        let (signals, _) = detect(&bars);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].stop_price, 116.0);
        assert_eq!(signals[0].entry_price, 109.0);
    }

    #[test]
    fn test_drift_back_inside_cancels_exit() {
        let bars = create_test_bars(&[
            (108.0, 113.0, 107.0, 112.0),
            (109.0, 110.0, 107.0, 108.0), // gapped back inside, no straddle
            (108.0, 109.0, 106.0, 107.0),
        ]);
        let (signals, state) = detect(&bars);

        assert!(signals.is_empty());
        assert!(state.waiting_for_breakout());
        assert_eq!(state.last_reentry, None);
    }

    #[test]
    fn test_open_on_boundary_is_not_an_exit() {
        let bars = create_test_bars(&[
            (110.0, 113.0, 109.5, 112.0),
            (111.0, 111.5, 107.5, 108.0),
            (107.5, 108.0, 106.0, 106.5),
        ]);
        let (signals, state) = detect(&bars);

        assert!(signals.is_empty());
        assert_eq!(state.last_exit, None);
        assert!(state.waiting_for_breakout());
    }

    #[test]
    fn test_close_on_boundary_is_not_an_exit_or_reentry() {
        let bars = create_test_bars(&[(108.0, 110.5, 107.0, 110.0)]);
        let (_, state) = detect(&bars);
        assert_eq!(state.last_exit, None);

        // Re-entry bar closes exactly on the high
        let bars = create_test_bars(&[
            (108.0, 113.0, 107.0, 112.0),
            (111.0, 111.5, 109.5, 110.0),
            (110.0, 110.5, 108.0, 108.5),
        ]);
        let (signals, state) = detect(&bars);
        assert!(signals.is_empty());
        assert_eq!(state.last_exit, Some(0));
        assert_eq!(state.last_reentry, None);
    }

    #[test]
    fn test_reentry_gap_beyond_entry_is_dropped() {
        // Entry opens above the exit/re-entry highs: stop would sit below entry
        let bars = create_test_bars(&[
            (108.0, 111.0, 107.0, 110.5),
            (110.5, 110.8, 108.0, 109.0),
            (112.0, 113.0, 111.5, 112.5),
        ]);
        let (signals, _) = detect(&bars);
        assert!(signals.is_empty());
    }
}
