//! Positions
//!
//! One outstanding long holding, tracked from the buy that opened it to the
//! sell that closes it. Prices are USD per whole token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::TokenIdentity;

/// Tolerance for threshold comparisons on float PnL (3.2 vs 4.0 is -19.999...96%)
const PNL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
    Pending,
    Failed,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    Manual,
    StopLoss,
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Manual => "MANUAL",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("Position is already closed")]
    AlreadyClosed,
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    /// Agent wallet address holding the tokens
    pub wallet: String,
    pub token: TokenIdentity,
    pub entry_price: f64,
    /// Whole tokens received by the opening buy
    pub quantity: f64,
    pub amount_sol: f64,
    pub amount_usd: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub open_tx: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub pnl_usd: Option<f64>,
    pub close_tx: Option<String>,
    pub exit_reason: Option<ExitReason>,
}

/// Exit details applied when a position closes
#[derive(Debug, Clone, PartialEq)]
pub struct PositionExit {
    pub exit_price: f64,
    pub tx_hash: Option<String>,
    pub reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}

impl Position {
    /// Open a position after a confirmed buy
    pub fn open(
        wallet: impl Into<String>,
        token: TokenIdentity,
        entry_price: f64,
        quantity: f64,
        amount_sol: f64,
        amount_usd: f64,
    ) -> Result<Self, PositionError> {
        if !(quantity > 0.0) {
            return Err(PositionError::InvalidQuantity(quantity));
        }
        if !(entry_price > 0.0) || !entry_price.is_finite() {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }

        Ok(Self {
            id: new_id(),
            wallet: wallet.into(),
            token,
            entry_price,
            quantity,
            amount_sol,
            amount_usd,
            stop_loss_pct: None,
            take_profit_pct: None,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            open_tx: None,
            closed_at: None,
            exit_price: None,
            pnl_pct: None,
            pnl_usd: None,
            close_tx: None,
            exit_reason: None,
        })
    }

    pub fn with_exits(mut self, stop_loss_pct: Option<f64>, take_profit_pct: Option<f64>) -> Self {
        self.stop_loss_pct = stop_loss_pct.filter(|p| *p > 0.0);
        self.take_profit_pct = take_profit_pct.filter(|p| *p > 0.0);
        self
    }

    pub fn with_open_tx(mut self, tx_hash: impl Into<String>) -> Self {
        self.open_tx = Some(tx_hash.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Unrealized PnL percentage at `price`
    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        pnl_pct(self.entry_price, price)
    }

    /// The exit condition `price` satisfies, if any. Stop-loss wins over take-profit.
    pub fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        let pnl = self.pnl_pct_at(price);
        if let Some(sl) = self.stop_loss_pct {
            if pnl <= -sl + PNL_EPSILON {
                return Some(ExitReason::StopLoss);
            }
        }
        if let Some(tp) = self.take_profit_pct {
            if pnl >= tp - PNL_EPSILON {
                return Some(ExitReason::TakeProfit);
            }
        }
        None
    }

    /// The single OPEN -> CLOSED transition
    pub fn close(&mut self, exit: PositionExit) -> Result<(), PositionError> {
        if self.status != PositionStatus::Open {
            return Err(PositionError::AlreadyClosed);
        }
        let pnl = pnl_pct(self.entry_price, exit.exit_price);
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit.exit_price);
        self.pnl_pct = Some(pnl);
        self.pnl_usd = Some(self.amount_usd * pnl / 100.0);
        self.close_tx = exit.tx_hash;
        self.exit_reason = Some(exit.reason);
        self.closed_at = Some(exit.closed_at);
        Ok(())
    }
}

/// Percentage change from `entry` to `current`
pub fn pnl_pct(entry: f64, current: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    (current - entry) / entry * 100.0
}

pub(crate) fn new_id() -> String {
    format!("{:x}{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn position() -> Position {
        Position::open("Wallet1", TokenIdentity::new("M1", "X", "Token X", 6), 4.0, 12.5, 0.33, 50.0)
            .unwrap()
            .with_exits(Some(20.0), Some(100.0))
    }

    #[test]
    fn test_open_position() {
        let p = position();
        assert!(p.is_open());
        assert_eq!(p.entry_price, 4.0);
        assert_eq!(p.stop_loss_pct, Some(20.0));
    }

    #[test]
    fn test_invalid_open() {
        let token = TokenIdentity::new("M1", "X", "Token X", 6);
        assert!(matches!(
            Position::open("W", token.clone(), 4.0, 0.0, 0.1, 1.0),
            Err(PositionError::InvalidQuantity(_))
        ));
        assert!(matches!(
            Position::open("W", token, f64::INFINITY, 1.0, 0.1, 1.0),
            Err(PositionError::InvalidEntryPrice(_))
        ));
    }

    #[test]
    fn test_round_trip_pnl() {
        assert_relative_eq!(pnl_pct(4.0, 4.0), 0.0);
        assert_relative_eq!(pnl_pct(4.0, 4.8), 20.0, epsilon = 1e-9);
        assert_relative_eq!(pnl_pct(4.0, 3.2), -20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exit_triggers() {
        let p = position();
        assert_eq!(p.exit_trigger(4.0), None);
        assert_eq!(p.exit_trigger(3.2), Some(ExitReason::StopLoss));
        assert_eq!(p.exit_trigger(2.0), Some(ExitReason::StopLoss));
        assert_eq!(p.exit_trigger(8.0), Some(ExitReason::TakeProfit));
        assert_eq!(p.exit_trigger(7.9), None);
    }

    #[test]
    fn test_no_exit_levels_never_trigger() {
        let p = position().with_exits(None, None);
        assert_eq!(p.exit_trigger(0.01), None);
        assert_eq!(p.exit_trigger(1_000.0), None);
    }

    #[test]
    fn test_close_once() {
        let mut p = position();
        let exit = PositionExit {
            exit_price: 4.8,
            tx_hash: Some("sig".to_string()),
            reason: ExitReason::Manual,
            closed_at: Utc::now(),
        };
        p.close(exit.clone()).unwrap();
        assert_eq!(p.status, PositionStatus::Closed);
        assert_relative_eq!(p.pnl_pct.unwrap(), 20.0, epsilon = 1e-9);
        assert_relative_eq!(p.pnl_usd.unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(p.close(exit), Err(PositionError::AlreadyClosed));
    }
}
