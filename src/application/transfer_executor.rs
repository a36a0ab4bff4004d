//! Transfer Executor
//!
//! Direct SOL or SPL token transfers out of an agent wallet. SPL transfers
//! create the recipient's associated token account in the same transaction
//! when it does not exist yet, with the sender paying.

use solana_sdk::instruction::Instruction;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use solana_sdk::system_instruction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use std::str::FromStr;
use std::sync::Arc;

use super::execution::{ExecFailure, ExecutionCore, ExecutorConfig, TxOutcome};
use crate::domain::token::{is_address_like, sol_to_lamports, to_base_units, DEFAULT_UNKNOWN_DECIMALS};
use crate::ports::chain::ChainRpc;
use crate::ports::storage::KeyStore;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub wallet: String,
    pub to: String,
    /// Whole SOL or whole tokens
    pub amount: f64,
    /// `None` for native SOL
    pub mint: Option<String>,
    pub decimals: Option<u8>,
}

impl TransferRequest {
    pub fn sol(wallet: impl Into<String>, to: impl Into<String>, amount: f64) -> Self {
        Self {
            wallet: wallet.into(),
            to: to.into(),
            amount,
            mint: None,
            decimals: None,
        }
    }

    pub fn token(
        wallet: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
        mint: impl Into<String>,
        decimals: Option<u8>,
    ) -> Self {
        Self {
            wallet: wallet.into(),
            to: to.into(),
            amount,
            mint: Some(mint.into()),
            decimals,
        }
    }
}

/// Recipient must be a base58 public key
pub fn parse_recipient(address: &str) -> Result<Pubkey, ExecFailure> {
    if !is_address_like(address) {
        return Err(ExecFailure::InvalidRecipient(address.to_string()));
    }
    Pubkey::from_str(address).map_err(|_| ExecFailure::InvalidRecipient(address.to_string()))
}

pub struct TransferExecutor {
    core: ExecutionCore,
}

impl TransferExecutor {
    pub fn new(chain: Arc<dyn ChainRpc>, keys: Arc<dyn KeyStore>) -> Self {
        Self::with_config(chain, keys, ExecutorConfig::default())
    }

    pub fn with_config(chain: Arc<dyn ChainRpc>, keys: Arc<dyn KeyStore>, config: ExecutorConfig) -> Self {
        Self {
            core: ExecutionCore::new(chain, keys, config),
        }
    }

    pub async fn transfer(&self, request: &TransferRequest) -> TxOutcome {
        tracing::info!(
            "Transfer {} {} from {} to {}",
            request.amount,
            request.mint.as_deref().unwrap_or("SOL"),
            request.wallet,
            request.to
        );
        match self.execute(request).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                tracing::error!("Transfer failed before submission: {}", failure);
                TxOutcome::failed(failure)
            }
        }
    }

    async fn execute(&self, request: &TransferRequest) -> Result<TxOutcome, ExecFailure> {
        let recipient = parse_recipient(&request.to)?;
        if request.to == request.wallet {
            return Err(ExecFailure::SelfTransfer);
        }
        if !(request.amount > 0.0) {
            return Err(ExecFailure::NonPositiveAmount);
        }

        let keypair = self.core.load_signer(&request.wallet).await?;
        let sender = keypair.pubkey();
        let balance = self.core.balance_lamports(&request.wallet).await?;

        let instructions = match &request.mint {
            None => {
                let lamports = sol_to_lamports(request.amount);
                self.core.require_balance(balance, lamports)?;
                vec![system_instruction::transfer(&sender, &recipient, lamports)]
            }
            Some(mint) => {
                // the token moves, but fees are still paid in SOL
                self.core.require_balance(balance, 0)?;
                let mint = Pubkey::from_str(mint).map_err(|_| ExecFailure::InvalidMint(mint.clone()))?;
                let decimals = request.decimals.unwrap_or(DEFAULT_UNKNOWN_DECIMALS);
                self.spl_instructions(&sender, &recipient, &mint, to_base_units(request.amount, decimals))
                    .await?
            }
        };

        let chain = &self.core.chain;
        let (blockhash, last_valid) = self
            .core
            .config
            .retry
            .run("getLatestBlockhash", move || chain.get_latest_blockhash())
            .await
            .map_err(|e| ExecFailure::Rpc(e.to_string()))?;

        let message = Message::new_with_blockhash(&instructions, Some(&sender), &blockhash);
        let signed = self.core.sign(VersionedMessage::Legacy(message), &keypair)?;

        Ok(self.core.submit_and_confirm(&signed, Some(last_valid)).await)
    }

    async fn spl_instructions(
        &self,
        sender: &Pubkey,
        recipient: &Pubkey,
        mint: &Pubkey,
        raw_amount: u64,
    ) -> Result<Vec<Instruction>, ExecFailure> {
        let source = get_associated_token_address(sender, mint);
        let destination = get_associated_token_address(recipient, mint);

        let chain = &self.core.chain;
        let destination_str = destination.to_string();
        let dest_ref = destination_str.as_str();
        let exists = self
            .core
            .config
            .retry
            .run("getAccountInfo", move || chain.account_exists(dest_ref))
            .await
            .map_err(|e| ExecFailure::Rpc(e.to_string()))?;

        let mut instructions = Vec::with_capacity(2);
        if !exists {
            tracing::info!("Creating recipient token account {}", destination);
            instructions.push(create_associated_token_account(sender, recipient, mint, &spl_token::id()));
        }
        instructions.push(
            spl_token::instruction::transfer(&spl_token::id(), &source, &destination, sender, &[], raw_amount)
                .map_err(|e| ExecFailure::Build(e.to_string()))?,
        );
        Ok(instructions)
    }
}
