use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::ports::chain::{ChainError, ChainRpc, ConfirmOutcome, SendOptions, TokenHolding};

/// Wrapper around Solana RPC client with async-compatible methods
#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    poll_interval: Duration,
}

impl SolanaClient {
    /// Create a new Solana RPC client at `confirmed` commitment
    pub fn new(rpc_url: String) -> Self {
        Self::with_commitment(rpc_url, CommitmentConfig::confirmed(), Duration::from_millis(500))
    }

    pub fn with_commitment(rpc_url: String, commitment: CommitmentConfig, poll_interval: Duration) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(rpc_url, commitment));
        Self {
            client,
            commitment,
            poll_interval,
        }
    }

    /// Run a blocking RPC call off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T, ChainError>
    where
        T: Send + 'static,
        F: FnOnce(&RpcClient) -> Result<T, ChainError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| ChainError::Rpc(format!("Task join error: {}", e)))?
    }
}

fn parse_pubkey(address: &str) -> Result<Pubkey, ChainError> {
    Pubkey::from_str(address).map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Read `{amount, decimals}` out of a jsonParsed SPL token account
fn parse_token_amount(data: &UiAccountData) -> Option<TokenHolding> {
    let UiAccountData::Json(parsed) = data else {
        return None;
    };
    let token_amount = &parsed.parsed["info"]["tokenAmount"];
    let amount = token_amount["amount"].as_str()?.parse::<u64>().ok()?;
    let decimals = token_amount["decimals"].as_u64()? as u8;
    Some(TokenHolding { amount, decimals })
}

#[async_trait]
impl ChainRpc for SolanaClient {
    async fn get_balance(&self, address: &str) -> Result<u64, ChainError> {
        let pubkey = parse_pubkey(address)?;
        self.blocking(move |c| c.get_balance(&pubkey).map_err(|e| ChainError::Rpc(e.to_string())))
            .await
    }

    async fn get_latest_blockhash(&self) -> Result<(Hash, u64), ChainError> {
        let commitment = self.commitment;
        self.blocking(move |c| {
            c.get_latest_blockhash_with_commitment(commitment)
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<String, ChainError> {
        let tx = tx.clone();
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            max_retries: options.max_retries,
            ..Default::default()
        };
        self.blocking(move |c| {
            c.send_transaction_with_config(&tx, config)
                .map(|sig| sig.to_string())
                .map_err(|e| ChainError::Send(e.to_string()))
        })
        .await
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        last_valid_block_height: u64,
    ) -> Result<ConfirmOutcome, ChainError> {
        let sig = Signature::from_str(signature).map_err(|e| ChainError::Malformed(e.to_string()))?;
        let commitment = self.commitment;

        loop {
            let status = self
                .blocking(move |c| {
                    c.get_signature_statuses(&[sig])
                        .map(|r| r.value.into_iter().next().flatten())
                        .map_err(|e| ChainError::Rpc(e.to_string()))
                })
                .await?;

            if let Some(status) = status {
                if let Some(err) = status.err {
                    return Ok(ConfirmOutcome::Failed(err.to_string()));
                }
                if status.satisfies_commitment(commitment) {
                    return Ok(ConfirmOutcome::Confirmed);
                }
            }

            let height = self
                .blocking(|c| c.get_block_height().map_err(|e| ChainError::Rpc(e.to_string())))
                .await?;
            if height > last_valid_block_height {
                return Ok(ConfirmOutcome::Expired);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<Option<TokenHolding>, ChainError> {
        let owner = parse_pubkey(owner)?;
        let mint = parse_pubkey(mint)?;

        let accounts = self
            .blocking(move |c| {
                c.get_token_accounts_by_owner(&owner, TokenAccountsFilter::Mint(mint))
                    .map_err(|e| ChainError::Rpc(e.to_string()))
            })
            .await?;

        let holdings: Vec<TokenHolding> = accounts
            .iter()
            .filter_map(|a| parse_token_amount(&a.account.data))
            .collect();
        let Some(first) = holdings.first() else {
            return Ok(None);
        };
        Ok(Some(TokenHolding {
            amount: holdings.iter().map(|h| h.amount).sum(),
            decimals: first.decimals,
        }))
    }

    async fn account_exists(&self, address: &str) -> Result<bool, ChainError> {
        let pubkey = parse_pubkey(address)?;
        let commitment = self.commitment;
        self.blocking(move |c| {
            c.get_account_with_commitment(&pubkey, commitment)
                .map(|r| r.value.is_some())
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_account_decoder::parse_account_data::ParsedAccount;

    #[tokio::test]
    async fn test_client_creation() {
        let client = SolanaClient::new("https://api.devnet.solana.com".to_string());
        assert!(std::mem::size_of_val(&client) > 0);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_rpc() {
        let client = SolanaClient::new("http://127.0.0.1:1".to_string());
        let err = client.get_balance("not-a-key").await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidAddress(_)));
    }

    #[test]
    fn test_parse_token_amount() {
        let data = UiAccountData::Json(ParsedAccount {
            program: "spl-token".to_string(),
            parsed: serde_json::json!({
                "info": { "tokenAmount": { "amount": "12500000", "decimals": 6, "uiAmount": 12.5 } },
                "type": "account"
            }),
            space: 165,
        });
        let holding = parse_token_amount(&data).unwrap();
        assert_eq!(holding.amount, 12_500_000);
        assert_eq!(holding.decimals, 6);
        assert_eq!(holding.ui_amount(), 12.5);
    }
}
