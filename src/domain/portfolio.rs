use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::position::{Position, PositionStatus};

/// An open position marked to a live price
#[derive(Debug, Clone, Serialize)]
pub struct Holding {
    pub position_id: String,
    pub mint: String,
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    /// `None` when no price was available for the mint
    pub current_price: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub pnl_usd: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub opened_at: DateTime<Utc>,
}

impl Holding {
    pub fn mark(position: &Position, price: Option<f64>) -> Self {
        let pnl_pct = price.map(|p| position.pnl_pct_at(p));
        Holding {
            position_id: position.id.clone(),
            mint: position.token.mint.clone(),
            symbol: position.token.symbol.clone(),
            quantity: position.quantity,
            entry_price: position.entry_price,
            current_price: price,
            pnl_pct,
            pnl_usd: pnl_pct.map(|pct| position.amount_usd * pct / 100.0),
            stop_loss_pct: position.stop_loss_pct,
            take_profit_pct: position.take_profit_pct,
            opened_at: position.opened_at,
        }
    }

    pub fn value_usd(&self) -> Option<f64> {
        self.current_price.map(|p| p * self.quantity)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub wallet: String,
    pub sol_balance: f64,
    pub sol_usd_rate: f64,
    pub open: Vec<Holding>,
    pub closed: Vec<Position>,
    pub realized_today_usd: f64,
    pub realized_today_pct: f64,
    pub wins: usize,
    pub losses: usize,
    pub total_value_usd: f64,
}

impl PortfolioSummary {
    /// Build a summary from a wallet's positions and whatever prices are known
    pub fn build(
        wallet: &str,
        positions: &[Position],
        prices: &HashMap<String, f64>,
        sol_balance: f64,
        sol_usd_rate: f64,
        today: NaiveDate,
    ) -> Self {
        let open: Vec<Holding> = positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| Holding::mark(p, prices.get(&p.token.mint).copied()))
            .collect();

        let mut closed: Vec<Position> = positions
            .iter()
            .filter(|p| p.status == PositionStatus::Closed)
            .cloned()
            .collect();
        closed.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));

        let wins = closed.iter().filter(|p| p.pnl_pct.unwrap_or(0.0) > 0.0).count();
        let losses = closed.iter().filter(|p| p.pnl_pct.unwrap_or(0.0) < 0.0).count();

        let realized_today_usd = realized_on(positions, today);
        let cost_today: f64 = positions
            .iter()
            .filter(|p| closed_on(p, today))
            .map(|p| p.amount_usd)
            .sum();
        let realized_today_pct = if cost_today > 0.0 {
            realized_today_usd / cost_today * 100.0
        } else {
            0.0
        };

        let holdings_usd: f64 = open.iter().filter_map(|h| h.value_usd()).sum();

        PortfolioSummary {
            wallet: wallet.to_string(),
            sol_balance,
            sol_usd_rate,
            open,
            closed,
            realized_today_usd,
            realized_today_pct,
            wins,
            losses,
            total_value_usd: sol_balance * sol_usd_rate + holdings_usd,
        }
    }
}

fn closed_on(p: &Position, day: NaiveDate) -> bool {
    p.status == PositionStatus::Closed && p.closed_at.map(|t| t.date_naive()) == Some(day)
}

/// Realized USD PnL of positions closed on `day` (negative for a loss)
pub fn realized_on(positions: &[Position], day: NaiveDate) -> f64 {
    positions
        .iter()
        .filter(|p| closed_on(p, day))
        .filter_map(|p| p.pnl_usd)
        .sum()
}
