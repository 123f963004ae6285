use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::market_data::MarketData;
use super::position::LivePosition;
use crate::backfill::{backfill_session, BarValidator};
use crate::indicators::IndicatorSet;
use crate::models::{Bar, EntrySignal, Interval};
use crate::strategy::session::{qualifying_start, trading_day};
use crate::strategy::{
    build_detector, compute_indicators, PriceRange, StrategyParams, StructureState,
    StructureStrategy, StructureVariant,
};
use crate::Result;

/// Per-trading-day memory
#[derive(Default)]
struct Episode {
    date: Option<NaiveDate>,
    initialized: bool,
    range: Option<PriceRange>,
    detector: Option<Box<dyn StructureStrategy>>,
    history: Vec<Bar>,
    indicators: IndicatorSet,
    /// Open times of trigger bars whose signals were already acted on or
    /// predate live watching
    consumed: HashSet<DateTime<Utc>>,
}

impl Episode {
    fn new(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }
}

/// Read-only view of the current episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSnapshot {
    pub date: Option<NaiveDate>,
    pub initialized: bool,
    pub range: Option<PriceRange>,
    pub bars: usize,
    pub consumed_signals: usize,
    pub structure: Option<StructureState>,
}

/// Bar-by-bar engine that replays the batch decision logic
///
/// State is scoped to a trading day in the reference timezone. On the first
/// bar at or after the qualifying hour the day's history is backfilled and
/// every signal in it is marked consumed; afterwards each new bar is appended,
/// indicators are recomputed in full and only signals triggered by that bar
/// can open a position. At most one position is open at a time and it
/// survives day rollovers.
pub struct LiveEngine {
    instrument: String,
    interval: Interval,
    params: StrategyParams,
    market_data: Arc<dyn MarketData>,
    validator: BarValidator,
    episode: Episode,
    last_bar: Option<Bar>,
    bars_seen: usize,
    position: Option<LivePosition>,
    closed_positions: Vec<LivePosition>,
}

impl LiveEngine {
    pub fn new(
        instrument: impl Into<String>,
        interval: Interval,
        params: StrategyParams,
        market_data: Arc<dyn MarketData>,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            instrument: instrument.into(),
            interval,
            params,
            market_data,
            validator: BarValidator::new(),
            episode: Episode::default(),
            last_bar: None,
            bars_seen: 0,
            position: None,
            closed_positions: Vec::new(),
        })
    }

    /// Process one newly closed bar
    ///
    /// Malformed or out-of-order bars are rejected before any state changes.
    /// Market-data failures during backfill are logged and retried on the
    /// next bar.
    pub fn on_new_bar(&mut self, bar: Bar) -> Result<()> {
        self.validator.validate(&bar, self.bars_seen)?;
        if let Some(last) = &self.last_bar {
            self.validator.validate_order(last, &bar, self.bars_seen)?;
        }
        self.last_bar = Some(bar);
        self.bars_seen += 1;

        let tz = self.params.session.timezone;
        let day = trading_day(bar.open_time, tz);

        // New trading day
        if self.episode.date != Some(day) {
            if self.episode.date.is_some() {
                tracing::info!(
                    instrument = %self.instrument,
                    "New trading day {}: resetting episode state",
                    day
                );
            }
            self.episode = Episode::new(day);
        }

        // Open position first, same touch rule as the simulator
        self.update_position(&bar);

        if !self.episode.initialized {
            let start = qualifying_start(day, tz, self.params.session.qualifying_hour);
            if bar.open_time < start {
                return Ok(());
            }
            if !self.initialize_episode(day, &bar) {
                return Ok(());
            }
        }

        self.episode.history.push(bar);
        self.episode.indicators = compute_indicators(&self.episode.history, &self.params);

        if self.position.is_some() {
            return Ok(());
        }

        let last_index = self.episode.history.len() - 1;
        let fresh: Vec<EntrySignal> = match self.episode.detector.as_ref() {
            Some(detector) => detector
                .detect_signals(&self.episode.history, &self.episode.indicators)
                .into_iter()
                .filter(|s| s.bar_index == last_index && !self.episode.consumed.contains(&s.time))
                .collect(),
            None => Vec::new(),
        };

        for signal in &fresh {
            self.episode.consumed.insert(signal.time);
        }

        if let Some(signal) = fresh.into_iter().last() {
            tracing::info!(
                instrument = %self.instrument,
                side = %signal.side,
                entry = signal.entry_price,
                stop = signal.stop_price,
                target = signal.target_price,
                "Opened position"
            );
            self.position = Some(LivePosition::open(&self.instrument, signal, bar.close_time));
        }

        Ok(())
    }

    fn update_position(&mut self, bar: &Bar) {
        let Some(position) = self.position.as_mut() else {
            return;
        };
        let Some(reason) = position.update(bar, &self.params.simulation) else {
            return;
        };

        tracing::info!(
            instrument = %self.instrument,
            side = %position.side(),
            reason = ?reason,
            r = position.r_multiple.unwrap_or_default(),
            "Closed position"
        );
        if let Some(closed) = self.position.take() {
            self.closed_positions.push(closed);
        }
    }

    /// Backfill the day and mark every historical signal consumed.
    /// Returns false when the episode could not be set up yet.
    fn initialize_episode(&mut self, day: NaiveDate, bar: &Bar) -> bool {
        let needs_range = self.params.variant == StructureVariant::RangeBreak;
        let backfill = match backfill_session(
            self.market_data.as_ref(),
            &self.instrument,
            self.interval,
            &self.params.session,
            day,
            bar.open_time,
            needs_range,
        ) {
            Ok(backfill) => backfill,
            Err(e) => {
                tracing::warn!(instrument = %self.instrument, "Backfill failed, will retry: {}", e);
                return false;
            }
        };

        if needs_range && backfill.range.is_none() {
            tracing::warn!(
                instrument = %self.instrument,
                "No opening range bars for {}, episode stays inactive",
                day
            );
            return false;
        }

        let detector = build_detector(&self.params, backfill.range);
        let indicators = compute_indicators(&backfill.history, &self.params);
        let consumed: HashSet<DateTime<Utc>> = detector
            .as_ref()
            .map(|d| {
                d.detect_signals(&backfill.history, &indicators)
                    .into_iter()
                    .map(|s| s.time)
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            instrument = %self.instrument,
            "Episode {} initialized: {} history bars, {} historical signals skipped",
            day,
            backfill.history.len(),
            consumed.len()
        );

        self.episode.initialized = true;
        self.episode.range = backfill.range;
        self.episode.detector = detector;
        self.episode.history = backfill.history;
        self.episode.indicators = indicators;
        self.episode.consumed = consumed;
        true
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Currently open position, if any
    pub fn open_position(&self) -> Option<&LivePosition> {
        self.position.as_ref()
    }

    /// Positions closed so far, oldest first
    pub fn closed_positions(&self) -> &[LivePosition] {
        &self.closed_positions
    }

    pub fn last_bar_time(&self) -> Option<DateTime<Utc>> {
        self.last_bar.map(|b| b.open_time)
    }

    /// Bars of the current episode
    pub fn history(&self) -> &[Bar] {
        &self.episode.history
    }

    /// Every signal the detector finds over the current episode
    pub fn episode_signals(&self) -> Vec<EntrySignal> {
        self.episode
            .detector
            .as_ref()
            .map(|d| d.detect_signals(&self.episode.history, &self.episode.indicators))
            .unwrap_or_default()
    }

    pub fn episode_state(&self) -> EpisodeSnapshot {
        EpisodeSnapshot {
            date: self.episode.date,
            initialized: self.episode.initialized,
            range: self.episode.range,
            bars: self.episode.history.len(),
            consumed_signals: self.episode.consumed.len(),
            structure: self
                .episode
                .detector
                .as_ref()
                .map(|d| d.structure_state(&self.episode.history, &self.episode.indicators)),
        }
    }
}
