use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backtest::simulator::{check_exit, r_multiple};
use crate::models::{Bar, EntrySignal, ExitReason, Outcome, Side};
use crate::strategy::SimulationParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Live counterpart of a simulated trade, closed in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePosition {
    pub id: Uuid,
    pub instrument: String,
    pub signal: EntrySignal,
    pub opened_at: DateTime<Utc>,
    /// Bars evaluated since the position was opened
    pub bars_held: usize,
    pub status: PositionStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub outcome: Option<Outcome>,
    pub r_multiple: Option<f64>,
}

impl LivePosition {
    pub fn open(instrument: &str, signal: EntrySignal, opened_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            signal,
            opened_at,
            bars_held: 0,
            status: PositionStatus::Open,
            closed_at: None,
            close_price: None,
            exit_reason: None,
            outcome: None,
            r_multiple: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn side(&self) -> Side {
        self.signal.side
    }

    pub fn entry_price(&self) -> f64 {
        self.signal.entry_price
    }

    pub fn stop_price(&self) -> f64 {
        self.signal.stop_price
    }

    pub fn target_price(&self) -> f64 {
        self.signal.target_price
    }

    /// Evaluate the position against a newly closed bar
    ///
    /// Uses the simulator's touch rule (stop before target), then the
    /// holding limit. Returns the exit reason if the bar closed the position.
    pub fn update(&mut self, bar: &Bar, params: &SimulationParams) -> Option<ExitReason> {
        if !self.is_open() {
            return None;
        }
        self.bars_held += 1;

        let signal = &self.signal;
        let (reason, price, r) = match check_exit(signal.side, signal.stop_price, signal.target_price, bar) {
            Some(ExitReason::StopLoss) => (ExitReason::StopLoss, signal.stop_price, -1.0),
            Some(ExitReason::TakeProfit) => {
                (ExitReason::TakeProfit, signal.target_price, signal.reward_multiple)
            }
            _ if params.max_hold_bars > 0 && self.bars_held >= params.max_hold_bars => {
                let r = r_multiple(signal.side, signal.entry_price, signal.risk, bar.close);
                (ExitReason::MaxHold, bar.close, r)
            }
            _ => return None,
        };

        let outcome = match reason {
            ExitReason::StopLoss => Outcome::Loss,
            ExitReason::TakeProfit => Outcome::Win,
            _ => Outcome::for_timed_exit(r, params.breakeven_band_r),
        };

        self.status = PositionStatus::Closed;
        self.closed_at = Some(bar.close_time);
        self.close_price = Some(price);
        self.exit_reason = Some(reason);
        self.outcome = Some(outcome);
        self.r_multiple = Some(r);

        Some(reason)
    }
}
