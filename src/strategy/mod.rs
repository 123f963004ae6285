// Structure detection module
pub mod params;
pub mod pullback;
pub mod range_break;
pub mod session;
pub mod trend;

pub use params::{
    FilterMode, PullbackParams, RangeBreakParams, RiskProfile, SessionConfig, SimulationParams,
    StrategyParams, StructureVariant, TrendBand,
};
pub use pullback::{PullbackPhase, PullbackState, PullbackStrategy};
pub use range_break::{PriceRange, RangeBreakState, RangeBreakStrategy, RangeSide};
pub use session::SessionWindow;
pub use trend::Trend;

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSet;
use crate::models::{Bar, EntrySignal};

/// Qualification logic that turns an episode of bars into entry signals
///
/// Implementations are pure: the same bars and indicators always produce the
/// same signals, and a signal at index `i` depends only on bars `..=i`. Both
/// the batch runner and the live engine rely on this to stay in step.
pub trait StructureStrategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &str;

    /// All signals over the episode, ordered by bar index
    fn detect_signals(&self, bars: &[Bar], indicators: &IndicatorSet) -> Vec<EntrySignal>;

    /// Machine memory after the last bar of the episode
    fn structure_state(&self, bars: &[Bar], indicators: &IndicatorSet) -> StructureState;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum StructureState {
    Pullback(PullbackState),
    RangeBreak(RangeBreakState),
}

/// Detector for one episode
///
/// The range-break variant needs the episode's opening range; without one
/// there is nothing to trade and `None` is returned.
pub fn build_detector(
    params: &StrategyParams,
    range: Option<PriceRange>,
) -> Option<Box<dyn StructureStrategy>> {
    match params.variant {
        StructureVariant::Pullback => Some(Box::new(PullbackStrategy::new(
            params.pullback.clone(),
            &params.session,
        ))),
        StructureVariant::RangeBreak => range.map(|range| {
            Box::new(RangeBreakStrategy::new(range, params.range_break.clone()))
                as Box<dyn StructureStrategy>
        }),
    }
}

/// Indicator set for `bars` with the configured periods
pub fn compute_indicators(bars: &[Bar], params: &StrategyParams) -> IndicatorSet {
    IndicatorSet::compute(
        bars,
        params.ema_fast_period,
        params.ema_slow_period,
        params.atr_period,
    )
}
