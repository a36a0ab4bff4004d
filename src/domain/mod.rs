//! Domain Layer - Core trading types for the memeterm pipeline
//!
//! Pure types and scoring with no I/O. All external interactions happen
//! through the ports layer.
//!
//! - `token`: token identity, base-unit conversion, address detection
//! - `safety`: point-additive rug/scam scoring
//! - `position`: open holdings and the single OPEN -> CLOSED transition
//! - `trade`: instructions, execution status and ledger records
//! - `risk`: portfolio-level limits and dynamic slippage
//! - `playbook`: automation catalogue and activity log entries
//! - `portfolio`: marked-to-market summaries

pub mod token;
pub mod safety;
pub mod position;
pub mod trade;
pub mod risk;
pub mod playbook;
pub mod portfolio;

pub use token::{TokenIdentity, TokenCandidate, Resolution, SOL_MINT, SOL_DECIMALS, LAMPORTS_PER_SOL};
pub use safety::{RiskLevel, SafetyAssessment, SafetyCheck, SecurityFacts, score_token};
pub use position::{Position, PositionStatus, PositionExit, PositionError, ExitReason, pnl_pct};
pub use trade::{ExecutionStatus, TradeAmount, TradeInstruction, TradeIntent, TradeRecord, TradeSide, SafetySnapshot};
pub use risk::{RiskParams, RiskViolation, dynamic_slippage_bps, SELL_SLIPPAGE_BPS};
pub use playbook::{ActivityEntry, ActivityType, Automation, PlaybookDefinition, TriggerType, ActionType};
pub use portfolio::{Holding, PortfolioSummary};
