use crate::models::{Bar, EntrySignal, ExitReason, Outcome, Side, TradeResult};
use crate::strategy::SimulationParams;

/// Stop/target touch on a single bar
///
/// When one bar reaches both levels the stop wins: intrabar order is
/// unknown, so the worse outcome is assumed.
pub fn check_exit(side: Side, stop: f64, target: f64, bar: &Bar) -> Option<ExitReason> {
    let (stop_hit, target_hit) = match side {
        Side::Long => (bar.low <= stop, bar.high >= target),
        Side::Short => (bar.high >= stop, bar.low <= target),
    };

    if stop_hit {
        Some(ExitReason::StopLoss)
    } else if target_hit {
        Some(ExitReason::TakeProfit)
    } else {
        None
    }
}

/// Realised R for an exit at `price`
pub fn r_multiple(side: Side, entry: f64, risk: f64, price: f64) -> f64 {
    side.sign() * (price - entry) / risk
}

/// Resolve one signal against the bars that follow it
///
/// Scanning starts on the bar after `signal.bar_index`. Stop and target exits
/// book the planned R (-1 / +reward) at the level price. Otherwise the trade
/// closes at the close of the last allowed bar: `max_hold_bars` after entry,
/// or the final bar when data runs out first.
pub fn simulate_trade(signal: &EntrySignal, bars: &[Bar], params: &SimulationParams) -> TradeResult {
    let first = signal.bar_index + 1;
    let last_bar = bars.len().saturating_sub(1);
    let hold_limit = match params.max_hold_bars {
        0 => last_bar,
        max_hold => last_bar.min(signal.bar_index + max_hold),
    };

    for (i, bar) in bars.iter().enumerate().take(hold_limit + 1).skip(first) {
        match check_exit(signal.side, signal.stop_price, signal.target_price, bar) {
            Some(ExitReason::StopLoss) => {
                return TradeResult {
                    signal: signal.clone(),
                    exit_index: i,
                    exit_time: bar.close_time,
                    exit_price: signal.stop_price,
                    exit_reason: ExitReason::StopLoss,
                    outcome: Outcome::Loss,
                    r_multiple: -1.0,
                };
            }
            Some(ExitReason::TakeProfit) => {
                return TradeResult {
                    signal: signal.clone(),
                    exit_index: i,
                    exit_time: bar.close_time,
                    exit_price: signal.target_price,
                    exit_reason: ExitReason::TakeProfit,
                    outcome: Outcome::Win,
                    r_multiple: signal.reward_multiple,
                };
            }
            _ => {}
        }
    }

    // Timed exit at the close of the last bar we were allowed to hold
    let exit_index = hold_limit.max(signal.bar_index.min(last_bar));
    let exit_reason = if params.max_hold_bars > 0 && signal.bar_index + params.max_hold_bars <= last_bar {
        ExitReason::MaxHold
    } else {
        ExitReason::EndOfData
    };

    let (exit_time, exit_price) = match bars.get(exit_index) {
        Some(bar) => (bar.close_time, bar.close),
        None => (signal.time, signal.entry_price),
    };
    let r = r_multiple(signal.side, signal.entry_price, signal.risk, exit_price);

    TradeResult {
        signal: signal.clone(),
        exit_index,
        exit_time,
        exit_price,
        exit_reason,
        outcome: Outcome::for_timed_exit(r, params.breakeven_band_r),
        r_multiple: r,
    }
}
