//! Agent wallet service: creation, balance and withdrawals

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use super::execution::TxOutcome;
use super::orchestrator::WalletLocks;
use super::transfer_executor::{TransferExecutor, TransferRequest};
use crate::domain::playbook::{ActivityEntry, ActivityType};
use crate::domain::token::{lamports_to_sol, TokenIdentity, DEFAULT_UNKNOWN_DECIMALS};
use crate::domain::trade::{TradeRecord, TradeSide};
use crate::ports::chain::{ChainError, ChainRpc};
use crate::ports::storage::{AutomationStore, KeyStore, KeyStoreError, TradeLedger, WalletInfo};

#[derive(Debug, Error)]
pub enum WalletServiceError {
    #[error("No wallet for user {0}")]
    NoWallet(String),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletBalance {
    pub address: String,
    pub lamports: u64,
    pub sol: f64,
}

pub struct WalletService {
    keys: Arc<dyn KeyStore>,
    chain: Arc<dyn ChainRpc>,
    transfers: Arc<TransferExecutor>,
    ledger: Arc<dyn TradeLedger>,
    activity: Arc<dyn AutomationStore>,
    locks: Arc<WalletLocks>,
}

impl WalletService {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        chain: Arc<dyn ChainRpc>,
        transfers: Arc<TransferExecutor>,
        ledger: Arc<dyn TradeLedger>,
        activity: Arc<dyn AutomationStore>,
        locks: Arc<WalletLocks>,
    ) -> Self {
        Self {
            keys,
            chain,
            transfers,
            ledger,
            activity,
            locks,
        }
    }

    /// Idempotent; an existing wallet comes back with `already_exists` set
    pub async fn create_wallet(&self, user_id: &str) -> Result<WalletInfo, WalletServiceError> {
        let info = self.keys.create(user_id).await?;
        if info.already_exists {
            tracing::info!("Wallet for {} already exists: {}", user_id, info.public_key);
        } else {
            tracing::info!("Created wallet {} for {}", info.public_key, user_id);
        }
        Ok(info)
    }

    pub async fn wallet(&self, user_id: &str) -> Result<Option<WalletInfo>, WalletServiceError> {
        Ok(self.keys.wallet_for_user(user_id).await?)
    }

    async fn require_wallet(&self, user_id: &str) -> Result<WalletInfo, WalletServiceError> {
        self.wallet(user_id)
            .await?
            .ok_or_else(|| WalletServiceError::NoWallet(user_id.to_string()))
    }

    pub async fn balance(&self, user_id: &str) -> Result<WalletBalance, WalletServiceError> {
        let wallet = self.require_wallet(user_id).await?;
        let lamports = self.chain.get_balance(&wallet.public_key).await?;
        Ok(WalletBalance {
            address: wallet.public_key,
            lamports,
            sol: lamports_to_sol(lamports),
        })
    }

    /// Send SOL (no `mint`) or an SPL token out of the user's wallet.
    /// Serialized with trades on the same wallet and recorded as a TRANSFER.
    pub async fn withdraw(
        &self,
        user_id: &str,
        to: &str,
        amount: f64,
        mint: Option<&str>,
        decimals: Option<u8>,
    ) -> Result<TxOutcome, WalletServiceError> {
        let wallet = self.require_wallet(user_id).await?;
        let address = wallet.public_key.as_str();
        let _guard = self.locks.acquire(address).await;

        let (request, token) = match mint {
            None => (TransferRequest::sol(address, to, amount), TokenIdentity::sol()),
            Some(mint) => {
                let decimals = match decimals {
                    Some(d) => d,
                    None => self.onchain_decimals(address, mint).await,
                };
                let token = TokenIdentity {
                    decimals,
                    ..TokenIdentity::unknown(mint)
                };
                (TransferRequest::token(address, to, amount, mint, Some(decimals)), token)
            }
        };

        let outcome = self.transfers.transfer(&request).await;

        let amount_sol = if mint.is_none() { amount } else { 0.0 };
        let mut record = TradeRecord::new(address, token.clone(), TradeSide::Transfer, outcome.status)
            .with_amounts(amount_sol, 0.0, amount)
            .with_tx(outcome.tx_hash.clone())
            .with_error(outcome.error.clone());
        record.counterparty = Some(to.to_string());
        if let Err(e) = self.ledger.append(&record).await {
            tracing::error!("Ledger write failed for transfer {}: {}", record.id, e);
        }

        let title = if outcome.is_success() {
            format!("Sent {} {}", amount, token.symbol)
        } else {
            format!("Transfer of {} {} failed", amount, token.symbol)
        };
        let entry = ActivityEntry::new(
            user_id,
            ActivityType::Transfer,
            title,
            outcome.error.clone().unwrap_or_else(|| format!("To {}", to)),
        )
        .with_metadata(json!({
            "to": to,
            "amount": amount,
            "mint": token.mint,
            "status": outcome.status,
            "txHash": outcome.tx_hash,
        }));
        if let Err(e) = self.activity.log_activity(&entry).await {
            tracing::warn!("Failed to log transfer activity: {}", e);
        }

        Ok(outcome)
    }

    async fn onchain_decimals(&self, owner: &str, mint: &str) -> u8 {
        match self.chain.get_token_balance(owner, mint).await {
            Ok(Some(holding)) => holding.decimals,
            Ok(None) => DEFAULT_UNKNOWN_DECIMALS,
            Err(e) => {
                tracing::warn!("Decimals lookup for {} failed: {}", mint, e);
                DEFAULT_UNKNOWN_DECIMALS
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::execution::ExecutorConfig;
    use crate::domain::trade::ExecutionStatus;
    use crate::ports::mocks::{FakeChain, InMemoryAutomationStore, InMemoryKeyStore, InMemoryLedger};
    use solana_sdk::signature::{Keypair, Signer};
    use std::time::Duration;

    fn service(keys: InMemoryKeyStore, chain: FakeChain) -> (WalletService, InMemoryLedger, InMemoryAutomationStore) {
        let keys = Arc::new(keys);
        let chain = Arc::new(chain);
        let ledger = InMemoryLedger::new();
        let activity = InMemoryAutomationStore::new();
        let transfers = TransferExecutor::with_config(
            chain.clone(),
            keys.clone(),
            ExecutorConfig {
                confirm_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let svc = WalletService::new(
            keys,
            chain,
            Arc::new(transfers),
            Arc::new(ledger.clone()),
            Arc::new(activity.clone()),
            Arc::new(WalletLocks::new()),
        );
        (svc, ledger, activity)
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (svc, _, _) = service(InMemoryKeyStore::new(), FakeChain::new());
        let first = svc.create_wallet("u1").await.unwrap();
        let second = svc.create_wallet("u1").await.unwrap();
        assert!(!first.already_exists);
        assert!(second.already_exists);
        assert_eq!(first.public_key, second.public_key);
    }

    #[tokio::test]
    async fn test_balance() {
        let kp = Keypair::new();
        let chain = FakeChain::new().with_balance(&kp.pubkey().to_string(), 1_500_000_000);
        let (svc, _, _) = service(InMemoryKeyStore::new().with_keypair("u1", &kp), chain);
        let balance = svc.balance("u1").await.unwrap();
        assert_eq!(balance.lamports, 1_500_000_000);
        assert!((balance.sol - 1.5).abs() < 1e-12);
        assert!(matches!(svc.balance("nobody").await, Err(WalletServiceError::NoWallet(_))));
    }

    #[tokio::test]
    async fn test_withdraw_records_transfer() {
        let kp = Keypair::new();
        let chain = FakeChain::new().with_balance(&kp.pubkey().to_string(), 1_000_000_000);
        let (svc, ledger, activity) = service(InMemoryKeyStore::new().with_keypair("u1", &kp), chain);
        let to = Keypair::new().pubkey().to_string();

        let outcome = svc.withdraw("u1", &to, 0.25, None, None).await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);

        let records = ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].side, TradeSide::Transfer);
        assert_eq!(records[0].counterparty.as_deref(), Some(to.as_str()));
        assert_eq!(activity.all_activity()[0].kind, ActivityType::Transfer);
    }

    #[tokio::test]
    async fn test_failed_withdraw_still_recorded() {
        let kp = Keypair::new();
        let (svc, ledger, _) = service(InMemoryKeyStore::new().with_keypair("u1", &kp), FakeChain::new());
        let to = Keypair::new().pubkey().to_string();

        let outcome = svc.withdraw("u1", &to, 1.0, None, None).await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(ledger.records()[0].status, ExecutionStatus::Failed);
    }
}
