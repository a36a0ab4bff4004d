//! Execution Core
//!
//! Shared by the swap and transfer executors: signer loading with the
//! key-integrity check, balance lookup, and the submit -> confirm discipline.
//! A transaction hash on its own never produces a SUCCESS outcome; only a
//! positive confirmation does.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use solana_sdk::message::VersionedMessage;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::retry::RetryPolicy;
use crate::domain::token::{lamports_to_sol, LAMPORTS_PER_SOL};
use crate::domain::trade::ExecutionStatus;
use crate::ports::chain::{ChainRpc, ConfirmOutcome, SendOptions};
use crate::ports::storage::KeyStore;

/// Smallest input amount worth paying fees for
pub const MIN_TRADE_BASE_UNITS: u64 = 10_000;

/// SOL kept back for network fees
pub const GAS_RESERVE_LAMPORTS: u64 = 5_000_000;

/// Typed failure taxonomy for swaps and transfers. Display strings are the
/// user-facing reasons.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecFailure {
    #[error("Trade amount too small. Minimum is {min} base units, got {amount}")]
    BelowDust { amount: u64, min: u64 },

    #[error("Amount must be greater than 0")]
    NonPositiveAmount,

    #[error("Wallet not found. Deploy your agent first.")]
    WalletNotFound(String),

    #[error("Wallet keypair mismatch for {0}")]
    KeyMismatch(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Insufficient SOL balance. Have {have:.4} SOL, need {need:.4} SOL (including gas reserve)")]
    InsufficientBalance { have: f64, need: f64 },

    #[error("Trade exceeds {cap_pct:.0}% of wallet balance. Max per trade: {max:.4} SOL")]
    ExceedsBalanceCap { max: f64, cap_pct: f64 },

    #[error("No swap route for {0}. It may be too new or only tradeable on its launchpad.")]
    NoRoute(String),

    #[error("Quote failed: {0}")]
    Quote(String),

    #[error("Swap transaction build failed: {0}")]
    Build(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Transaction send failed: {0}")]
    Send(String),

    #[error("Transaction expired (blockhash not found). Please try again.")]
    Expired,

    #[error("Insufficient funds for this transaction: {0}")]
    InsufficientFunds(String),

    #[error("Transaction failed: slippage exceeded. The token price moved too fast. Try again.")]
    SlippageExceeded,

    #[error("Transaction failed on-chain: {0}")]
    OnChain(String),

    #[error("Confirmation failed: {0}. Check the explorer to verify.")]
    Unconfirmed(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Invalid token mint: {0}")]
    InvalidMint(String),

    #[error("Cannot transfer to your own wallet")]
    SelfTransfer,
}

/// Jupiter's SlippageToleranceExceeded custom error
const SLIPPAGE_ERROR_CODE: u32 = 6001;

/// SPL Token's InsufficientFunds custom error
const INSUFFICIENT_FUNDS_CODE: u32 = 1;

static PROGRAM_ERROR_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcustom program error: 0x([0-9a-f]+)\b|\bCustom\((\d+)\)").expect("Invalid program error regex")
});

/// Custom program error code carried by an RPC or simulation message
fn program_error_code(message: &str) -> Option<u32> {
    let caps = PROGRAM_ERROR_CODE.captures(message)?;
    match (caps.get(1), caps.get(2)) {
        (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
        (_, Some(dec)) => dec.as_str().parse().ok(),
        _ => None,
    }
}

/// Map a raw RPC/program error message onto a specific failure
pub fn classify_error(message: &str) -> Option<ExecFailure> {
    let code = program_error_code(message);
    if message.contains("SlippageToleranceExceeded") || code == Some(SLIPPAGE_ERROR_CODE) {
        Some(ExecFailure::SlippageExceeded)
    } else if message.contains("Blockhash not found") {
        Some(ExecFailure::Expired)
    } else if message.to_lowercase().contains("insufficient") || code == Some(INSUFFICIENT_FUNDS_CODE) {
        Some(ExecFailure::InsufficientFunds(message.to_string()))
    } else {
        None
    }
}

/// What a confirmed swap actually filled
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fill {
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u16,
}

/// Result of one swap or transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxOutcome {
    pub status: ExecutionStatus,
    pub tx_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<ExecFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
}

impl TxOutcome {
    pub fn success(tx_hash: String, explorer_base: &str) -> Self {
        Self {
            status: ExecutionStatus::Success,
            explorer_url: Some(explorer_url(explorer_base, &tx_hash)),
            tx_hash: Some(tx_hash),
            error: None,
            failure: None,
            fill: None,
        }
    }

    /// Failure before anything reached the chain
    pub fn failed(failure: ExecFailure) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            tx_hash: None,
            explorer_url: None,
            error: Some(failure.to_string()),
            failure: Some(failure),
            fill: None,
        }
    }

    /// Failure after submission; the hash is kept for manual verification
    pub fn failed_with_hash(tx_hash: String, explorer_base: &str, failure: ExecFailure) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            explorer_url: Some(explorer_url(explorer_base, &tx_hash)),
            tx_hash: Some(tx_hash),
            error: Some(failure.to_string()),
            failure: Some(failure),
            fill: None,
        }
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

fn explorer_url(base: &str, tx_hash: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), tx_hash)
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub min_trade_base_units: u64,
    pub gas_reserve_lamports: u64,
    /// Largest fraction of the SOL balance a single swap may spend
    pub max_trade_balance_fraction: f64,
    /// Escalation rungs; the first is the default starting tolerance
    pub slippage_ladder_bps: Vec<u16>,
    pub retry: RetryPolicy,
    pub confirm_timeout: Duration,
    pub send_options: SendOptions,
    pub explorer_base_url: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            min_trade_base_units: MIN_TRADE_BASE_UNITS,
            gas_reserve_lamports: GAS_RESERVE_LAMPORTS,
            max_trade_balance_fraction: 0.5,
            slippage_ladder_bps: vec![300, 500, 1000],
            retry: RetryPolicy::default(),
            confirm_timeout: Duration::from_secs(60),
            send_options: SendOptions::default(),
            explorer_base_url: "https://solscan.io/tx".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Starting tolerance followed by every configured rung above it
    pub fn slippage_ladder(&self, initial_bps: Option<u16>) -> Vec<u16> {
        let first = initial_bps
            .or_else(|| self.slippage_ladder_bps.first().copied())
            .unwrap_or(300);
        std::iter::once(first)
            .chain(self.slippage_ladder_bps.iter().copied().filter(|b| *b > first))
            .collect()
    }
}

/// Collaborators and policy shared by both executors
#[derive(Clone)]
pub struct ExecutionCore {
    pub(crate) chain: Arc<dyn ChainRpc>,
    pub(crate) keys: Arc<dyn KeyStore>,
    pub(crate) config: ExecutorConfig,
}

impl ExecutionCore {
    pub fn new(chain: Arc<dyn ChainRpc>, keys: Arc<dyn KeyStore>, config: ExecutorConfig) -> Self {
        Self { chain, keys, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Keypair for `wallet`, verified against the address it is stored under
    pub async fn load_signer(&self, wallet: &str) -> Result<Keypair, ExecFailure> {
        let keypair = self
            .keys
            .keypair(wallet)
            .await
            .map_err(|e| ExecFailure::KeyStore(e.to_string()))?
            .ok_or_else(|| ExecFailure::WalletNotFound(wallet.to_string()))?;

        let derived = keypair.pubkey().to_string();
        if derived != wallet {
            tracing::error!("Key mismatch: stored {} derived {}", wallet, derived);
            return Err(ExecFailure::KeyMismatch(wallet.to_string()));
        }
        Ok(keypair)
    }

    pub async fn balance_lamports(&self, wallet: &str) -> Result<u64, ExecFailure> {
        let chain = &self.chain;
        self.config
            .retry
            .run("getBalance", move || chain.get_balance(wallet))
            .await
            .map_err(|e| ExecFailure::Rpc(format!("checking balance: {}", e)))
    }

    /// Require `amount + gas reserve` lamports
    pub fn require_balance(&self, balance: u64, amount: u64) -> Result<(), ExecFailure> {
        let need = amount.saturating_add(self.config.gas_reserve_lamports);
        if balance < need {
            return Err(ExecFailure::InsufficientBalance {
                have: lamports_to_sol(balance),
                need: lamports_to_sol(need),
            });
        }
        Ok(())
    }

    pub fn sign(&self, message: VersionedMessage, keypair: &Keypair) -> Result<VersionedTransaction, ExecFailure> {
        VersionedTransaction::try_new(message, &[keypair]).map_err(|e| ExecFailure::Sign(e.to_string()))
    }

    /// Submit a locally signed transaction and wait for confirmation.
    ///
    /// Only the send of this same signed transaction is retried. A confirmation
    /// that times out or errors yields FAILED with the hash attached.
    pub async fn submit_and_confirm(
        &self,
        tx: &VersionedTransaction,
        last_valid_block_height: Option<u64>,
    ) -> TxOutcome {
        let base = self.config.explorer_base_url.as_str();
        let chain = &self.chain;
        let options = self.config.send_options;

        let signature = match self
            .config
            .retry
            .run("sendTransaction", move || chain.send_transaction(tx, options))
            .await
        {
            Ok(sig) => sig,
            Err(e) => {
                let msg = e.to_string();
                tracing::error!("Send failed: {}", msg);
                return TxOutcome::failed(classify_error(&msg).unwrap_or(ExecFailure::Send(msg)));
            }
        };
        tracing::info!("Sent transaction {}", signature);

        let last_valid = match last_valid_block_height {
            Some(h) => h,
            None => match self
                .config
                .retry
                .run("getLatestBlockhash", move || chain.get_latest_blockhash())
                .await
            {
                Ok((_, h)) => h,
                Err(e) => {
                    return TxOutcome::failed_with_hash(signature, base, ExecFailure::Unconfirmed(e.to_string()));
                }
            },
        };

        let confirm = tokio::time::timeout(
            self.config.confirm_timeout,
            self.chain.confirm_transaction(&signature, last_valid),
        )
        .await;

        match confirm {
            Ok(Ok(ConfirmOutcome::Confirmed)) => {
                tracing::info!("Confirmed {}", signature);
                TxOutcome::success(signature, base)
            }
            Ok(Ok(ConfirmOutcome::Failed(err))) => {
                tracing::error!("On-chain error for {}: {}", signature, err);
                let failure = classify_error(&err).unwrap_or(ExecFailure::OnChain(err));
                TxOutcome::failed_with_hash(signature, base, failure)
            }
            Ok(Ok(ConfirmOutcome::Expired)) => {
                tracing::warn!("Blockhash expired before {} confirmed", signature);
                TxOutcome::failed_with_hash(signature, base, ExecFailure::Expired)
            }
            Ok(Err(e)) => {
                tracing::warn!("Could not confirm {}: {}", signature, e);
                TxOutcome::failed_with_hash(signature, base, ExecFailure::Unconfirmed(e.to_string()))
            }
            Err(_) => {
                tracing::warn!("Confirmation of {} timed out", signature);
                TxOutcome::failed_with_hash(
                    signature,
                    base,
                    ExecFailure::Unconfirmed(format!("timed out after {}s", self.config.confirm_timeout.as_secs())),
                )
            }
        }
    }
}

/// Whole SOL the swap cap allows out of `balance` lamports
pub fn max_trade_sol(balance: u64, fraction: f64) -> f64 {
    balance as f64 * fraction / LAMPORTS_PER_SOL as f64
}
