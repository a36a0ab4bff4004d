//! Durable repository ports: keys, ledger, positions, automations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Keypair;
use thiserror::Error;

use crate::domain::playbook::{ActivityEntry, Automation};
use crate::domain::position::{Position, PositionExit};
use crate::domain::trade::TradeRecord;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption key error: {0}")]
    InvalidKey(String),

    #[error("Failed to seal secret: {0}")]
    Encryption(String),

    #[error("Failed to open sealed secret: {0}")]
    Decryption(String),

    #[error("Keypair does not match stored public key {0}")]
    KeyMismatch(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Error, Debug)]
pub enum PositionStoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Position not found: {0}")]
    NotFound(String),

    #[error("Position already closed: {0}")]
    AlreadyClosed(String),
}

#[derive(Error, Debug)]
pub enum AutomationStoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Public view of an agent wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub user_id: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    /// True when `create` found an existing wallet instead of minting one
    #[serde(default)]
    pub already_exists: bool,
}

/// Agent wallet key store. One wallet per user, never rotated.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn create(&self, user_id: &str) -> Result<WalletInfo, KeyStoreError>;

    async fn wallet_for_user(&self, user_id: &str) -> Result<Option<WalletInfo>, KeyStoreError>;

    /// Signing keypair for a wallet address, `None` if no wallet has it
    async fn keypair(&self, address: &str) -> Result<Option<Keypair>, KeyStoreError>;
}

/// Ledger query. Bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub wallet: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn wallet(wallet: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &TradeRecord) -> bool {
        record.wallet == self.wallet
            && self.since.map_or(true, |t| record.created_at >= t)
            && self.until.map_or(true, |t| record.created_at <= t)
    }
}

/// Append-only trade/transfer ledger
#[async_trait]
pub trait TradeLedger: Send + Sync {
    async fn append(&self, record: &TradeRecord) -> Result<(), LedgerError>;

    /// Matching records, newest first
    async fn history(&self, query: &HistoryQuery) -> Result<Vec<TradeRecord>, LedgerError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn insert(&self, position: &Position) -> Result<(), PositionStoreError>;

    async fn get(&self, id: &str) -> Result<Option<Position>, PositionStoreError>;

    /// Open positions, optionally for one wallet
    async fn open_positions(&self, wallet: Option<&str>) -> Result<Vec<Position>, PositionStoreError>;

    /// Most recently opened OPEN position for the wallet and mint
    async fn latest_open(&self, wallet: &str, mint: &str) -> Result<Option<Position>, PositionStoreError>;

    /// Apply the single OPEN -> CLOSED transition and return the closed position
    async fn close(&self, id: &str, exit: PositionExit) -> Result<Position, PositionStoreError>;

    async fn for_wallet(&self, wallet: &str) -> Result<Vec<Position>, PositionStoreError>;
}

/// Playbook activations and the per-user activity log
#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn get(&self, user_id: &str, playbook_id: &str) -> Result<Option<Automation>, AutomationStoreError>;

    async fn upsert(&self, automation: &Automation) -> Result<(), AutomationStoreError>;

    async fn list(&self, user_id: &str) -> Result<Vec<Automation>, AutomationStoreError>;

    /// Bump the execution counter; false when the user never activated the playbook
    async fn record_execution(
        &self,
        user_id: &str,
        playbook_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AutomationStoreError>;

    async fn log_activity(&self, entry: &ActivityEntry) -> Result<(), AutomationStoreError>;

    /// Newest first
    async fn activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEntry>, AutomationStoreError>;
}
