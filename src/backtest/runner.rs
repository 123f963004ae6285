use serde::{Deserialize, Serialize};

use crate::backfill::BarValidator;
use crate::backtest::metrics::BacktestSummary;
use crate::backtest::simulator::simulate_trade;
use crate::indicators::IndicatorSet;
use crate::models::{Bar, EntrySignal, TradeResult};
use crate::strategy::session::{qualifying_start, trading_day};
use crate::strategy::{build_detector, compute_indicators, PriceRange, StrategyParams, StructureVariant};
use crate::Result;

/// Everything a batch run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Every signal the detector emitted, taken or not
    pub signals: Vec<EntrySignal>,
    /// Trades actually simulated, one open position at a time
    pub trades: Vec<TradeResult>,
    /// Indicator series over the whole input
    pub indicators: IndicatorSet,
    pub summary: BacktestSummary,
}

/// Offline runner: indicators, structure detection and simulation over one
/// bar array
pub struct BatchRunner {
    params: StrategyParams,
    validator: BarValidator,
}

impl BatchRunner {
    /// Create a runner; invalid parameters reject the run up front
    pub fn new(params: StrategyParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            validator: BarValidator::new(),
        })
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Run over `bars`
    ///
    /// # Arguments
    /// * `bars` - Closed bars, strictly increasing by open time
    ///
    /// # Returns
    /// Signals, simulated trades, indicator series and the R summary
    pub fn run(&self, bars: &[Bar]) -> Result<BatchReport> {
        self.validator.validate_series(bars)?;

        tracing::info!(
            "Starting batch run: {} bars, variant {:?}",
            bars.len(),
            self.params.variant
        );

        let indicators = compute_indicators(bars, &self.params);
        let signals = match self.params.variant {
            // The whole array is one episode
            StructureVariant::Pullback => match build_detector(&self.params, None) {
                Some(detector) => detector.detect_signals(bars, &indicators),
                None => Vec::new(),
            },
            StructureVariant::RangeBreak => self.detect_range_break_days(bars),
        };

        let trades = self.simulate(&signals, bars);
        let summary = BacktestSummary::from_trades(&trades);

        tracing::info!(
            "Batch run complete: {} signals, {} trades, win rate {:.1}%, expectancy {:.3}R, total {:.2}R",
            signals.len(),
            summary.total_trades,
            summary.win_rate,
            summary.expectancy_r,
            summary.total_r
        );

        Ok(BatchReport {
            signals,
            trades,
            indicators,
            summary,
        })
    }

    /// One episode per trading day: the bars before the qualifying hour build
    /// the range, the rest of the day is scanned against it. Indicators are
    /// computed per episode, as the live engine does.
    fn detect_range_break_days(&self, bars: &[Bar]) -> Vec<EntrySignal> {
        let tz = self.params.session.timezone;
        let mut signals = Vec::new();
        let mut day_start = 0;

        while day_start < bars.len() {
            let day = trading_day(bars[day_start].open_time, tz);
            let day_end = bars[day_start..]
                .iter()
                .position(|b| trading_day(b.open_time, tz) != day)
                .map_or(bars.len(), |offset| day_start + offset);

            let start = qualifying_start(day, tz, self.params.session.qualifying_hour);
            let episode_start = bars[day_start..day_end]
                .iter()
                .position(|b| b.open_time >= start)
                .map_or(day_end, |offset| day_start + offset);

            let range = PriceRange::from_bars(&bars[day_start..episode_start]);
            match build_detector(&self.params, range) {
                Some(detector) => {
                    let episode = &bars[episode_start..day_end];
                    let indicators = compute_indicators(episode, &self.params);
                    signals.extend(
                        detector
                            .detect_signals(episode, &indicators)
                            .into_iter()
                            .map(|s| s.offset(episode_start)),
                    );
                }
                None => tracing::debug!("{}: no opening range, day skipped", day),
            }

            day_start = day_end;
        }

        signals
    }

    /// Simulate signals in order, skipping any that fire while a trade is open
    fn simulate(&self, signals: &[EntrySignal], bars: &[Bar]) -> Vec<TradeResult> {
        let mut trades: Vec<TradeResult> = Vec::new();

        for signal in signals {
            if let Some(open) = trades.last() {
                if signal.bar_index < open.exit_index {
                    tracing::debug!(
                        "Skipping signal at bar {}: position open until bar {}",
                        signal.bar_index,
                        open.exit_index
                    );
                    continue;
                }
            }

            let trade = simulate_trade(signal, bars, &self.params.simulation);
            tracing::debug!(
                "Trade {} @ {:.4}: {:?} at bar {} ({:+.2}R)",
                signal.side,
                signal.entry_price,
                trade.outcome,
                trade.exit_index,
                trade.r_multiple
            );
            trades.push(trade);
        }

        trades
    }
}

/// Run one batch over `bars` with `params`
pub fn run_batch(bars: &[Bar], params: &StrategyParams) -> Result<BatchReport> {
    BatchRunner::new(params.clone())?.run(bars)
}
