//! Stop-loss and range enforcement
//!
//! Stop-loss is evaluated as realized loss in percent of invested capital.
//! Out-of-range is a warning verdict only: the price may re-enter the grid,
//! so the session logs and keeps going.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskVerdict {
    Ok,
    /// Fatal: cancel all pending orders and stop the bot
    StopLoss { loss_percent: f64 },
    /// Warning only
    OutOfRange { price: f64 },
}

#[derive(Debug, Clone)]
pub struct RiskGuard {
    investment: f64,
    stop_loss_percent: f64,
    lower_price: f64,
    upper_price: f64,
}

impl RiskGuard {
    pub fn new(investment: f64, stop_loss_percent: f64, lower_price: f64, upper_price: f64) -> Self {
        Self {
            investment,
            stop_loss_percent,
            lower_price,
            upper_price,
        }
    }

    /// Evaluate risk from the current price and cumulative realized profit.
    ///
    /// Stop-loss dominates: a breached loss limit is reported even when the
    /// price is also out of range.
    pub fn evaluate(&self, current_price: f64, realized_profit: f64) -> RiskVerdict {
        let profit_percent = if self.investment > 0.0 {
            realized_profit / self.investment * 100.0
        } else {
            0.0
        };

        if profit_percent < -self.stop_loss_percent {
            return RiskVerdict::StopLoss {
                loss_percent: profit_percent,
            };
        }

        if current_price < self.lower_price || current_price > self.upper_price {
            return RiskVerdict::OutOfRange {
                price: current_price,
            };
        }

        RiskVerdict::Ok
    }
}
