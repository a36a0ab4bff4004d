use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

use crate::domain::token::to_ui_amount;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Malformed data: {0}")]
    Malformed(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::Send(_))
    }
}

/// Submission options for a signed transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub max_retries: Option<usize>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            max_retries: Some(3),
        }
    }
}

/// Result of waiting for a submitted signature
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// Included but reverted, with the on-chain error text
    Failed(String),
    /// Blockhash expired before the signature was seen
    Expired,
}

/// A wallet's holding of one SPL mint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenHolding {
    /// Raw base units
    pub amount: u64,
    pub decimals: u8,
}

impl TokenHolding {
    pub fn ui_amount(&self) -> f64 {
        to_ui_amount(self.amount, self.decimals)
    }
}

/// Chain RPC port
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Native balance in lamports
    async fn get_balance(&self, address: &str) -> Result<u64, ChainError>;

    /// Latest blockhash and the last block height it stays valid for
    async fn get_latest_blockhash(&self) -> Result<(Hash, u64), ChainError>;

    /// Submit a signed transaction, returning its signature
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<String, ChainError>;

    /// Wait until the signature is confirmed, reverts, or its blockhash expires
    async fn confirm_transaction(
        &self,
        signature: &str,
        last_valid_block_height: u64,
    ) -> Result<ConfirmOutcome, ChainError>;

    /// Summed holding of `mint` across the owner's token accounts; `None` if it holds none
    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<Option<TokenHolding>, ChainError>;

    async fn account_exists(&self, address: &str) -> Result<bool, ChainError>;
}
