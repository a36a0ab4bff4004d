use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest share of the SOL balance a single swap may spend
pub const SINGLE_TRADE_BALANCE_CAP: f64 = 0.5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskViolation {
    #[error("Amount {amount:.4} SOL exceeds max position size ({pct}% = {max:.4} SOL)")]
    PositionSizeExceeded { amount: f64, max: f64, pct: f64 },

    #[error("Already holding {open} open positions (limit {limit})")]
    TooManyOpenPositions { open: usize, limit: usize },

    #[error("Daily loss ${loss:.2} exceeds drawdown limit ${limit:.2}")]
    DailyDrawdownExceeded { loss: f64, limit: f64 },

    #[error("Trade amount must be greater than 0")]
    NonPositiveAmount,
}

/// Portfolio-level risk parameters applied by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub max_position_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub daily_drawdown_pct: f64,
    pub max_open_positions: usize,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_position_pct: 5.0,
            stop_loss_pct: 20.0,
            take_profit_pct: 100.0,
            daily_drawdown_pct: 15.0,
            max_open_positions: 5,
        }
    }
}

impl RiskParams {
    /// Largest buy in SOL allowed for `balance_sol`: the stricter of the
    /// position-size cap and the executor's single-trade cap.
    pub fn max_buy_sol(&self, balance_sol: f64) -> f64 {
        let fraction = (self.max_position_pct / 100.0).min(SINGLE_TRADE_BALANCE_CAP);
        balance_sol * fraction
    }

    pub fn validate_position_size(&self, amount_sol: f64, balance_sol: f64) -> Result<(), RiskViolation> {
        if amount_sol <= 0.0 {
            return Err(RiskViolation::NonPositiveAmount);
        }
        let max = self.max_buy_sol(balance_sol);
        if amount_sol > max {
            return Err(RiskViolation::PositionSizeExceeded {
                amount: amount_sol,
                max,
                pct: (self.max_position_pct).min(SINGLE_TRADE_BALANCE_CAP * 100.0),
            });
        }
        Ok(())
    }

    pub fn validate_open_positions(&self, open: usize) -> Result<(), RiskViolation> {
        if self.max_open_positions > 0 && open >= self.max_open_positions {
            return Err(RiskViolation::TooManyOpenPositions { open, limit: self.max_open_positions });
        }
        Ok(())
    }

    /// `realized_today_usd` is negative for a loss
    pub fn validate_daily_drawdown(&self, realized_today_usd: f64, portfolio_usd: f64) -> Result<(), RiskViolation> {
        let limit = portfolio_usd * self.daily_drawdown_pct / 100.0;
        let loss = -realized_today_usd;
        if loss > 0.0 && loss > limit {
            return Err(RiskViolation::DailyDrawdownExceeded { loss, limit });
        }
        Ok(())
    }
}

/// Initial slippage tolerance for a buy of `amount_usd`
pub fn dynamic_slippage_bps(amount_usd: f64) -> u16 {
    if amount_usd < 50.0 {
        500
    } else if amount_usd <= 200.0 {
        300
    } else {
        100
    }
}

/// Initial slippage tolerance for sells
pub const SELL_SLIPPAGE_BPS: u16 = 300;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_size_uses_stricter_cap() {
        let params = RiskParams::default();
        assert!((params.max_buy_sol(10.0) - 0.5).abs() < 1e-12);
        assert!(params.validate_position_size(0.5, 10.0).is_ok());
        assert!(matches!(
            params.validate_position_size(0.6, 10.0),
            Err(RiskViolation::PositionSizeExceeded { .. })
        ));

        // a lax portfolio cap still respects the 50% single-trade cap
        let lax = RiskParams { max_position_pct: 80.0, ..Default::default() };
        assert!((lax.max_buy_sol(10.0) - 5.0).abs() < 1e-12);
        assert!(lax.validate_position_size(6.0, 10.0).is_err());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let params = RiskParams::default();
        assert_eq!(params.validate_position_size(0.0, 10.0), Err(RiskViolation::NonPositiveAmount));
    }

    #[test]
    fn test_open_position_limit() {
        let params = RiskParams::default();
        assert!(params.validate_open_positions(4).is_ok());
        assert!(params.validate_open_positions(5).is_err());
        let unlimited = RiskParams { max_open_positions: 0, ..Default::default() };
        assert!(unlimited.validate_open_positions(100).is_ok());
    }

    #[test]
    fn test_daily_drawdown() {
        let params = RiskParams::default();
        // 15% of $1000 = $150
        assert!(params.validate_daily_drawdown(-100.0, 1000.0).is_ok());
        assert!(params.validate_daily_drawdown(200.0, 1000.0).is_ok());
        assert!(params.validate_daily_drawdown(-151.0, 1000.0).is_err());
    }

    #[test]
    fn test_dynamic_slippage() {
        assert_eq!(dynamic_slippage_bps(10.0), 500);
        assert_eq!(dynamic_slippage_bps(50.0), 300);
        assert_eq!(dynamic_slippage_bps(200.0), 300);
        assert_eq!(dynamic_slippage_bps(500.0), 100);
    }
}
