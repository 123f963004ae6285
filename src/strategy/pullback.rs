use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::params::{PullbackParams, SessionConfig};
use super::session::SessionWindow;
use super::trend::{classify, Trend};
use super::{StructureState, StructureStrategy};
use crate::indicators::IndicatorSet;
use crate::models::{Bar, EntrySignal, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullbackPhase {
    NoTrend,
    TrackingSwing,
    InPullback,
}

/// Machine memory after the last scanned bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullbackState {
    pub phase: PullbackPhase,
    pub trend: Trend,
    pub trend_age: usize,
    pub swing_extreme: Option<f64>,
    /// A bar has closed on the trend side of the fast EMA since the last
    /// trend start, abort or entry
    pub armed: bool,
    pub pullback_start: Option<usize>,
    pub pullback_bars: usize,
    pub pullback_extreme: Option<f64>,
    pub signals_in_trend: usize,
}

impl Default for PullbackState {
    fn default() -> Self {
        Self {
            phase: PullbackPhase::NoTrend,
            trend: Trend::None,
            trend_age: 0,
            swing_extreme: None,
            armed: false,
            pullback_start: None,
            pullback_bars: 0,
            pullback_extreme: None,
            signals_in_trend: 0,
        }
    }
}

impl PullbackState {
    fn start_trend(&mut self, trend: Trend, bar: &Bar, ema_fast: Option<f64>) {
        *self = Self {
            trend,
            trend_age: 1,
            ..Self::default()
        };

        if let (Some(side), Some(ema)) = (trend.side(), ema_fast) {
            self.phase = PullbackPhase::TrackingSwing;
            self.swing_extreme = Some(side.with_trend_extreme(bar));
            self.armed = side.sign() * (bar.close - ema) >= 0.0;
        }
    }

    fn extend_swing(&mut self, side: Side, bar: &Bar) {
        let extreme = side.with_trend_extreme(bar);
        match self.swing_extreme {
            Some(swing) if !side.further(extreme, swing) => {}
            _ => self.swing_extreme = Some(extreme),
        }
    }

    fn begin_pullback(&mut self, index: usize, side: Side, bar: &Bar) {
        self.phase = PullbackPhase::InPullback;
        self.pullback_start = Some(index);
        self.pullback_bars = 1;
        self.pullback_extreme = Some(side.against_trend_extreme(bar));
    }

    fn accumulate(&mut self, side: Side, bar: &Bar) {
        self.pullback_bars += 1;
        let extreme = side.against_trend_extreme(bar);
        match self.pullback_extreme {
            // Against the trend means further in the opposite direction
            Some(current) if !side.further(current, extreme) => {}
            _ => self.pullback_extreme = Some(extreme),
        }
    }

    fn clear_pullback(&mut self) {
        self.phase = PullbackPhase::TrackingSwing;
        self.pullback_start = None;
        self.pullback_bars = 0;
        self.pullback_extreme = None;
    }

    fn depth_atr(&self, side: Side, atr: f64) -> Option<f64> {
        let swing = self.swing_extreme?;
        let extreme = self.pullback_extreme?;
        Some(side.sign() * (swing - extreme) / atr)
    }
}

/// Trend-following pullback detector
///
/// Tracks the swing extremum of a fast/slow EMA trend, waits for closes
/// against the fast EMA and emits an entry when price closes back through it
/// within the configured depth, duration and distance limits.
#[derive(Debug, Clone)]
pub struct PullbackStrategy {
    params: PullbackParams,
    timezone: Tz,
    trade_window: SessionWindow,
}

impl PullbackStrategy {
    pub fn new(params: PullbackParams, session: &SessionConfig) -> Self {
        Self {
            params,
            timezone: session.timezone,
            trade_window: session.trade_window,
        }
    }

    /// Run the machine over the whole sequence
    pub fn scan(&self, bars: &[Bar], indicators: &IndicatorSet) -> (Vec<EntrySignal>, PullbackState) {
        let mut state = PullbackState::default();
        let mut signals = Vec::new();

        for (i, bar) in bars.iter().enumerate() {
            let snapshot = indicators.snapshot(i);
            let (ema_fast, atr) = match (snapshot.ema_fast, snapshot.ema_slow, snapshot.atr) {
                (Some(fast), Some(_), Some(atr)) => (fast, atr),
                // Incomplete indicators make the bar inert
                _ => {
                    if state.trend != Trend::None {
                        state.start_trend(Trend::None, bar, None);
                    } else {
                        state.trend_age += 1;
                    }
                    continue;
                }
            };

            let trend = classify(
                snapshot.ema_fast,
                snapshot.ema_slow,
                snapshot.atr,
                self.params.trend_band,
            );

            if trend != state.trend {
                tracing::trace!("bar {}: trend {:?} -> {:?}", i, state.trend, trend);
                state.start_trend(trend, bar, Some(ema_fast));
                continue;
            }
            state.trend_age += 1;

            let Some(side) = trend.side() else {
                continue;
            };
            let offset = side.sign() * (bar.close - ema_fast);

            match state.phase {
                PullbackPhase::NoTrend => {}
                PullbackPhase::TrackingSwing => {
                    state.extend_swing(side, bar);
                    if offset >= 0.0 {
                        state.armed = true;
                    } else if state.armed {
                        state.begin_pullback(i, side, bar);
                        self.abort_if_exhausted(&mut state, side, atr, i);
                    }
                }
                PullbackPhase::InPullback => {
                    if offset <= 0.0 {
                        state.accumulate(side, bar);
                        self.abort_if_exhausted(&mut state, side, atr, i);
                    } else {
                        match self.try_entry(&state, i, bar, side, ema_fast, atr, indicators) {
                            Some(signal) => {
                                tracing::debug!(
                                    "pullback entry at bar {}: {} @ {:.4} stop {:.4} target {:.4}",
                                    i,
                                    signal.side,
                                    signal.entry_price,
                                    signal.stop_price,
                                    signal.target_price
                                );
                                signals.push(signal);
                                state.signals_in_trend += 1;
                                state.clear_pullback();
                                state.swing_extreme = Some(side.with_trend_extreme(bar));
                            }
                            None => {
                                state.clear_pullback();
                                state.extend_swing(side, bar);
                            }
                        }
                        state.armed = true;
                    }
                }
            }
        }

        (signals, state)
    }

    fn abort_if_exhausted(&self, state: &mut PullbackState, side: Side, atr: f64, index: usize) {
        let too_long = state.pullback_bars > self.params.max_pullback_bars;
        let too_deep = state
            .depth_atr(side, atr)
            .is_some_and(|depth| depth > self.params.max_pullback_depth_atr);

        if too_long || too_deep {
            tracing::trace!(
                "bar {}: pullback aborted (bars={}, too_deep={})",
                index,
                state.pullback_bars,
                too_deep
            );
            state.clear_pullback();
            state.armed = false;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_entry(
        &self,
        state: &PullbackState,
        index: usize,
        bar: &Bar,
        side: Side,
        ema_fast: f64,
        atr: f64,
        indicators: &IndicatorSet,
    ) -> Option<EntrySignal> {
        let p = &self.params;
        let sign = side.sign();

        let depth = state.depth_atr(side, atr)?;
        let bars_ok = (p.min_pullback_bars..=p.max_pullback_bars).contains(&state.pullback_bars);
        let depth_ok = depth >= p.min_pullback_depth_atr && depth <= p.max_pullback_depth_atr;
        let touched = sign * (side.against_trend_extreme(bar) - ema_fast) <= p.touch_tolerance_atr * atr;
        let near_ema = sign * (bar.close - ema_fast) <= p.max_entry_distance_from_ema_atr * atr;
        let mature = state.trend_age >= p.min_trend_bars;
        let strong = indicators
            .snapshot(index)
            .ema_slow
            .is_some_and(|slow| (ema_fast - slow).abs() >= p.min_trend_gap);
        let in_session = self.trade_window.contains(bar.close_time, self.timezone);
        let under_cap = p.max_pullbacks_per_trend == 0 || state.signals_in_trend < p.max_pullbacks_per_trend;

        if !(bars_ok && depth_ok && touched && near_ema && mature && strong && in_session && under_cap) {
            tracing::trace!(
                "bar {}: re-cross rejected (bars_ok={}, depth={:.2}, touched={}, near_ema={}, mature={}, strong={}, in_session={}, under_cap={})",
                index, bars_ok, depth, touched, near_ema, mature, strong, in_session, under_cap
            );
            return None;
        }

        // Stop sits beyond the pullback extremum, re-cross bar included
        let pullback_extreme = state.pullback_extreme?;
        let bar_extreme = side.against_trend_extreme(bar);
        let extreme = if side.further(pullback_extreme, bar_extreme) {
            bar_extreme
        } else {
            pullback_extreme
        };

        let entry = bar.close;
        let stop = extreme - sign * p.atr_buffer_mult * atr;
        let risk = sign * (entry - stop);
        if !(risk > 0.0) {
            tracing::debug!("bar {}: degenerate stop {:.4} for entry {:.4}, signal dropped", index, stop, entry);
            return None;
        }

        Some(EntrySignal {
            bar_index: index,
            time: bar.open_time,
            side,
            entry_price: entry,
            stop_price: stop,
            target_price: entry + sign * p.reward_multiple * risk,
            risk,
            reward_multiple: p.reward_multiple,
            indicators: indicators.snapshot(index),
        })
    }
}

impl StructureStrategy for PullbackStrategy {
    fn name(&self) -> &str {
        "pullback"
    }

    fn detect_signals(&self, bars: &[Bar], indicators: &IndicatorSet) -> Vec<EntrySignal> {
        self.scan(bars, indicators).0
    }

    fn structure_state(&self, bars: &[Bar], indicators: &IndicatorSet) -> StructureState {
        StructureState::Pullback(self.scan(bars, indicators).1)
    }
}
