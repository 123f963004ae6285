use serde::{Deserialize, Serialize};

use crate::models::{Outcome, TradeResult};

/// Aggregate performance of a batch run, in R units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    // Trade Statistics
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    pub timeouts: usize,
    /// Percent of trades that hit target
    pub win_rate: f64,

    // R Distribution
    pub avg_r_win: f64,
    pub avg_r_loss: f64,
    pub avg_r_breakeven: f64,
    pub avg_r_timeout: f64,
    pub total_r: f64,
    /// Σ P(class) × avg R(class) over the outcome classes
    pub expectancy_r: f64,
    /// Gross positive R / gross negative R
    pub profit_factor: f64,

    // Risk Metrics
    pub max_drawdown_r: f64,
}

impl BacktestSummary {
    /// Calculate the summary from resolved trades
    pub fn from_trades(trades: &[TradeResult]) -> Self {
        let total_trades = trades.len();
        if total_trades == 0 {
            return Self::empty();
        }

        let class = |outcome: Outcome| -> (usize, f64) {
            let rs: Vec<f64> = trades
                .iter()
                .filter(|t| t.outcome == outcome)
                .map(|t| t.r_multiple)
                .collect();
            let avg = if rs.is_empty() {
                0.0
            } else {
                rs.iter().sum::<f64>() / rs.len() as f64
            };
            (rs.len(), avg)
        };

        let (wins, avg_r_win) = class(Outcome::Win);
        let (losses, avg_r_loss) = class(Outcome::Loss);
        let (breakevens, avg_r_breakeven) = class(Outcome::Breakeven);
        let (timeouts, avg_r_timeout) = class(Outcome::Timeout);

        let n = total_trades as f64;
        let expectancy_r: f64 = [
            (wins, avg_r_win),
            (losses, avg_r_loss),
            (breakevens, avg_r_breakeven),
            (timeouts, avg_r_timeout),
        ]
        .iter()
        .map(|&(count, avg)| (count as f64 / n) * avg)
        .sum();

        let total_r: f64 = trades.iter().map(|t| t.r_multiple).sum();

        // Profit factor
        let gross_win: f64 = trades.iter().map(|t| t.r_multiple).filter(|r| *r > 0.0).sum();
        let gross_loss: f64 = trades
            .iter()
            .map(|t| t.r_multiple)
            .filter(|r| *r < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_win / gross_loss
        } else if gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            total_trades,
            wins,
            losses,
            breakevens,
            timeouts,
            win_rate: (wins as f64 / n) * 100.0,
            avg_r_win,
            avg_r_loss,
            avg_r_breakeven,
            avg_r_timeout,
            total_r,
            expectancy_r,
            profit_factor,
            max_drawdown_r: Self::calculate_drawdown(trades),
        }
    }

    /// Empty summary for when no trades occurred
    pub fn empty() -> Self {
        Self {
            total_trades: 0,
            wins: 0,
            losses: 0,
            breakevens: 0,
            timeouts: 0,
            win_rate: 0.0,
            avg_r_win: 0.0,
            avg_r_loss: 0.0,
            avg_r_breakeven: 0.0,
            avg_r_timeout: 0.0,
            total_r: 0.0,
            expectancy_r: 0.0,
            profit_factor: 0.0,
            max_drawdown_r: 0.0,
        }
    }

    /// Largest peak-to-trough drop of the cumulative R curve
    fn calculate_drawdown(trades: &[TradeResult]) -> f64 {
        let mut peak = 0.0_f64;
        let mut equity = 0.0;
        let mut max_dd = 0.0;

        for trade in trades {
            equity += trade.r_multiple;
            peak = peak.max(equity);
            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }

        max_dd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntrySignal, ExitReason, IndicatorSnapshot, Side};
    use chrono::{TimeZone, Utc};

    fn create_trade(outcome: Outcome, r_multiple: f64) -> TradeResult {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap();
        TradeResult {
            signal: EntrySignal {
                bar_index: 0,
                time,
                side: Side::Long,
                entry_price: 100.0,
                stop_price: 99.0,
                target_price: 102.0,
                risk: 1.0,
                reward_multiple: 2.0,
                indicators: IndicatorSnapshot::default(),
            },
            exit_index: 1,
            exit_time: time,
            exit_price: 100.0 + r_multiple,
            exit_reason: ExitReason::EndOfData,
            outcome,
            r_multiple,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = BacktestSummary::from_trades(&[]);
        assert_eq!(summary, BacktestSummary::empty());
    }

    #[test]
    fn test_summary_counts_and_averages() {
        let trades = vec![
            create_trade(Outcome::Win, 2.0),
            create_trade(Outcome::Loss, -1.0),
            create_trade(Outcome::Loss, -1.0),
            create_trade(Outcome::Breakeven, 0.0),
            create_trade(Outcome::Timeout, 0.5),
        ];
        let summary = BacktestSummary::from_trades(&trades);

        assert_eq!(summary.total_trades, 5);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 2);
        assert_eq!(summary.breakevens, 1);
        assert_eq!(summary.timeouts, 1);
        assert!((summary.win_rate - 20.0).abs() < 1e-9);
        assert_eq!(summary.avg_r_win, 2.0);
        assert_eq!(summary.avg_r_loss, -1.0);
        assert!((summary.total_r - 0.5).abs() < 1e-9);
        // 0.2*2 + 0.4*(-1) + 0.2*0 + 0.2*0.5
        assert!((summary.expectancy_r - 0.1).abs() < 1e-9);
        assert!((summary.profit_factor - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_in_r() {
        let trades = vec![
            create_trade(Outcome::Win, 2.0),
            create_trade(Outcome::Loss, -1.0),
            create_trade(Outcome::Loss, -1.0),
            create_trade(Outcome::Loss, -1.0),
            create_trade(Outcome::Win, 2.0),
        ];
        let summary = BacktestSummary::from_trades(&trades);
        assert!((summary.max_drawdown_r - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_profit_factor_without_losses() {
        let trades = vec![create_trade(Outcome::Win, 2.0)];
        let summary = BacktestSummary::from_trades(&trades);
        assert!(summary.profit_factor.is_infinite());
        assert_eq!(summary.win_rate, 100.0);
    }
}
