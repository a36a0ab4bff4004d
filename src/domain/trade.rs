//! Trades, instructions and ledger records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::new_id;
use super::safety::{RiskLevel, SafetyAssessment};
use super::token::TokenIdentity;

/// Authoritative outcome of any execution entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Blocked,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeIntent {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
    Transfer,
}

impl From<TradeIntent> for TradeSide {
    fn from(intent: TradeIntent) -> Self {
        match intent {
            TradeIntent::Buy => TradeSide::Buy,
            TradeIntent::Sell => TradeSide::Sell,
        }
    }
}

/// How much to trade. Buys take native or quote-currency sizes (or a share of
/// the SOL balance); sells take a share of the held token balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAmount {
    Sol(f64),
    Usd(f64),
    Pct(f64),
}

/// Structured instruction from the direct API or an upstream intent parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub intent: TradeIntent,
    pub token_query: String,
    #[serde(default)]
    pub amount_sol: Option<f64>,
    #[serde(default)]
    pub amount_usd: Option<f64>,
    #[serde(default)]
    pub amount_pct: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    /// Parser confidence, carried through untouched
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl TradeInstruction {
    pub fn buy_usd(token_query: impl Into<String>, usd: f64) -> Self {
        Self::new(TradeIntent::Buy, token_query).with_amount(TradeAmount::Usd(usd))
    }

    pub fn buy_sol(token_query: impl Into<String>, sol: f64) -> Self {
        Self::new(TradeIntent::Buy, token_query).with_amount(TradeAmount::Sol(sol))
    }

    pub fn sell_pct(token_query: impl Into<String>, pct: f64) -> Self {
        Self::new(TradeIntent::Sell, token_query).with_amount(TradeAmount::Pct(pct))
    }

    pub fn new(intent: TradeIntent, token_query: impl Into<String>) -> Self {
        Self {
            intent,
            token_query: token_query.into(),
            amount_sol: None,
            amount_usd: None,
            amount_pct: None,
            stop_loss_pct: None,
            take_profit_pct: None,
            confidence: None,
        }
    }

    pub fn with_amount(mut self, amount: TradeAmount) -> Self {
        match amount {
            TradeAmount::Sol(v) => self.amount_sol = Some(v),
            TradeAmount::Usd(v) => self.amount_usd = Some(v),
            TradeAmount::Pct(v) => self.amount_pct = Some(v),
        }
        self
    }

    pub fn with_exits(mut self, stop_loss_pct: Option<f64>, take_profit_pct: Option<f64>) -> Self {
        self.stop_loss_pct = stop_loss_pct;
        self.take_profit_pct = take_profit_pct;
        self
    }

    /// The sizing the instruction asked for, native amount first
    pub fn amount(&self) -> Option<TradeAmount> {
        self.amount_sol
            .map(TradeAmount::Sol)
            .or(self.amount_usd.map(TradeAmount::Usd))
            .or(self.amount_pct.map(TradeAmount::Pct))
    }
}

/// Safety evaluation attached to a ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub score: u8,
    pub level: RiskLevel,
    pub risks: Vec<String>,
}

impl From<&SafetyAssessment> for SafetySnapshot {
    fn from(a: &SafetyAssessment) -> Self {
        Self {
            score: a.score,
            level: a.level,
            risks: a.risks.clone(),
        }
    }
}

/// Immutable ledger entry for one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub wallet: String,
    pub token: TokenIdentity,
    pub side: TradeSide,
    pub amount_sol: f64,
    pub amount_usd: f64,
    pub amount_tokens: f64,
    pub price_usd: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub tx_hash: Option<String>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub safety: Option<SafetySnapshot>,
    /// Destination for transfers
    pub counterparty: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(wallet: impl Into<String>, token: TokenIdentity, side: TradeSide, status: ExecutionStatus) -> Self {
        Self {
            id: new_id(),
            wallet: wallet.into(),
            token,
            side,
            amount_sol: 0.0,
            amount_usd: 0.0,
            amount_tokens: 0.0,
            price_usd: None,
            pnl_pct: None,
            tx_hash: None,
            status,
            error: None,
            safety: None,
            counterparty: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_amounts(mut self, amount_sol: f64, amount_usd: f64, amount_tokens: f64) -> Self {
        self.amount_sol = amount_sol;
        self.amount_usd = amount_usd;
        self.amount_tokens = amount_tokens;
        self
    }

    pub fn with_tx(mut self, tx_hash: Option<String>) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_safety(mut self, safety: Option<&SafetyAssessment>) -> Self {
        self.safety = safety.map(SafetySnapshot::from);
        self
    }
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} {:.4} SOL (${:.2}) -> {}",
            self.side, self.token.symbol, self.amount_sol, self.amount_usd, self.status
        )
    }
}
