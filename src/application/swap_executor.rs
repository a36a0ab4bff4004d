//! Swap Executor
//!
//! Quote -> build -> sign -> submit -> confirm for one swap through the
//! routing service. Quotes escalate through the slippage ladder when a rung
//! returns zero output or fails; a "no route" answer ends the swap at once.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;

use super::execution::{max_trade_sol, ExecFailure, ExecutionCore, ExecutorConfig, Fill, TxOutcome};
use crate::domain::token::{lamports_to_sol, SOL_MINT};
use crate::ports::chain::ChainRpc;
use crate::ports::routing::{QuoteError, QuoteParams, QuoteService, RouteQuote};
use crate::ports::storage::KeyStore;

#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub wallet: String,
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in base units
    pub amount: u64,
    /// Starting slippage tolerance; the ladder's first rung when absent
    pub slippage_bps: Option<u16>,
}

impl SwapRequest {
    pub fn buy(wallet: impl Into<String>, output_mint: impl Into<String>, lamports: u64) -> Self {
        Self {
            wallet: wallet.into(),
            input_mint: SOL_MINT.to_string(),
            output_mint: output_mint.into(),
            amount: lamports,
            slippage_bps: None,
        }
    }

    pub fn sell(wallet: impl Into<String>, input_mint: impl Into<String>, base_units: u64) -> Self {
        Self {
            wallet: wallet.into(),
            input_mint: input_mint.into(),
            output_mint: SOL_MINT.to_string(),
            amount: base_units,
            slippage_bps: None,
        }
    }

    pub fn with_slippage(mut self, bps: u16) -> Self {
        self.slippage_bps = Some(bps);
        self
    }
}

pub struct SwapExecutor {
    core: ExecutionCore,
    quotes: Arc<dyn QuoteService>,
}

impl SwapExecutor {
    pub fn new(quotes: Arc<dyn QuoteService>, chain: Arc<dyn ChainRpc>, keys: Arc<dyn KeyStore>) -> Self {
        Self::with_config(quotes, chain, keys, ExecutorConfig::default())
    }

    pub fn with_config(
        quotes: Arc<dyn QuoteService>,
        chain: Arc<dyn ChainRpc>,
        keys: Arc<dyn KeyStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            core: ExecutionCore::new(chain, keys, config),
            quotes,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        self.core.config()
    }

    pub async fn swap(&self, request: &SwapRequest) -> TxOutcome {
        tracing::info!(
            "Swap {} -> {} amount={} wallet={}",
            request.input_mint,
            request.output_mint,
            request.amount,
            request.wallet
        );
        match self.execute(request).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                tracing::error!("Swap failed before submission: {}", failure);
                TxOutcome::failed(failure)
            }
        }
    }

    async fn execute(&self, request: &SwapRequest) -> Result<TxOutcome, ExecFailure> {
        let config = self.core.config();
        if request.amount < config.min_trade_base_units {
            return Err(ExecFailure::BelowDust {
                amount: request.amount,
                min: config.min_trade_base_units,
            });
        }

        let keypair = self.core.load_signer(&request.wallet).await?;

        let balance = self.core.balance_lamports(&request.wallet).await?;
        if request.input_mint == SOL_MINT {
            self.core.require_balance(balance, request.amount)?;
            let max = max_trade_sol(balance, config.max_trade_balance_fraction);
            if lamports_to_sol(request.amount) > max {
                return Err(ExecFailure::ExceedsBalanceCap {
                    max,
                    cap_pct: config.max_trade_balance_fraction * 100.0,
                });
            }
        }

        let quote = self.quote_with_escalation(request).await?;
        tracing::debug!(
            "Accepted quote out={} at {}bps (impact {:.2}%)",
            quote.out_amount,
            quote.slippage_bps,
            quote.price_impact_pct
        );

        let quotes = &self.quotes;
        let wallet = request.wallet.as_str();
        let quote_ref = &quote;
        let swap_tx = config
            .retry
            .run("buildSwapTransaction", move || quotes.build_swap_transaction(wallet, quote_ref))
            .await
            .map_err(|e| ExecFailure::Build(e.to_string()))?;

        let bytes = B64
            .decode(swap_tx.swap_transaction.as_bytes())
            .map_err(|e| ExecFailure::Build(format!("invalid base64: {}", e)))?;
        let unsigned: VersionedTransaction =
            bincode::deserialize(&bytes).map_err(|e| ExecFailure::Build(format!("invalid transaction: {}", e)))?;
        let signed = self.core.sign(unsigned.message, &keypair)?;

        let outcome = self
            .core
            .submit_and_confirm(&signed, swap_tx.last_valid_block_height)
            .await;

        Ok(outcome.with_fill(Fill {
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
            slippage_bps: quote.slippage_bps,
        }))
    }

    async fn quote_with_escalation(&self, request: &SwapRequest) -> Result<RouteQuote, ExecFailure> {
        let config = self.core.config();
        let ladder = config.slippage_ladder(request.slippage_bps);
        let mut last_error: Option<QuoteError> = None;

        for slippage_bps in ladder {
            let params = QuoteParams {
                input_mint: request.input_mint.clone(),
                output_mint: request.output_mint.clone(),
                amount: request.amount,
                slippage_bps,
            };
            let quotes = &self.quotes;
            let params_ref = &params;
            let label = format!("quote ({}bps)", slippage_bps);

            match config.retry.run(&label, move || quotes.get_quote(params_ref)).await {
                Ok(quote) if quote.out_amount > 0 => return Ok(quote),
                Ok(_) => {
                    tracing::info!("Zero output at {}bps, escalating", slippage_bps);
                }
                Err(QuoteError::NoRoute(detail)) => {
                    tracing::warn!("No route for {}: {}", request.output_mint, detail);
                    let mint = if request.input_mint == SOL_MINT {
                        &request.output_mint
                    } else {
                        &request.input_mint
                    };
                    return Err(ExecFailure::NoRoute(mint.clone()));
                }
                Err(e) => {
                    tracing::warn!("Quote failed at {}bps: {}", slippage_bps, e);
                    last_error = Some(e);
                }
            }
        }

        Err(ExecFailure::Quote(match last_error {
            Some(e) => e.to_string(),
            None => "all slippage levels returned zero output".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryPolicy;
    use crate::domain::trade::ExecutionStatus;
    use crate::ports::chain::ConfirmOutcome;
    use crate::ports::mocks::{FakeChain, FakeQuoteService, InMemoryKeyStore};
    use regex::Regex;
    use solana_sdk::signature::{Keypair, Signer};
    use std::time::Duration;

    const MINT: &str = "M1nt1111111111111111111111111111111111111111";
    const SOL: u64 = 1_000_000_000;

    struct Harness {
        executor: SwapExecutor,
        quotes: FakeQuoteService,
        chain: FakeChain,
        wallet: String,
    }

    fn harness(quotes: FakeQuoteService, chain: FakeChain) -> Harness {
        let kp = Keypair::new();
        let wallet = kp.pubkey().to_string();
        let chain = chain.with_balance(&wallet, 2 * SOL);
        let keys = InMemoryKeyStore::new().with_keypair("u1", &kp);
        let config = ExecutorConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            confirm_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        Harness {
            executor: SwapExecutor::with_config(Arc::new(quotes.clone()), Arc::new(chain.clone()), Arc::new(keys), config),
            quotes,
            chain,
            wallet,
        }
    }

    #[tokio::test]
    async fn test_successful_buy() {
        let h = harness(FakeQuoteService::new().with_out_amount(MINT, 12_500_000), FakeChain::new());
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, SOL / 3)).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.fill.unwrap().out_amount, 12_500_000);
        let url = Regex::new(r"^https://solscan\.io/tx/[1-9A-HJ-NP-Za-km-z]{64,88}$").unwrap();
        assert!(url.is_match(outcome.explorer_url.as_deref().unwrap()));
        assert_eq!(h.chain.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dust_rejected_without_calls() {
        let h = harness(FakeQuoteService::new(), FakeChain::new());
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, 9_999)).await;
        assert!(matches!(outcome.failure, Some(ExecFailure::BelowDust { .. })));
        assert!(h.quotes.quote_calls().is_empty());
    }

    #[tokio::test]
    async fn test_half_balance_cap() {
        let h = harness(FakeQuoteService::new(), FakeChain::new());
        // 1.2 SOL of a 2 SOL balance passes the reserve check but not the 50% cap
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, 1_200_000_000)).await;
        assert!(matches!(outcome.failure, Some(ExecFailure::ExceedsBalanceCap { .. })));
        assert_eq!(outcome.tx_hash, None);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let h = harness(FakeQuoteService::new(), FakeChain::new());
        h.chain.set_balance(&h.wallet, 3_000_000);
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, 1_000_000)).await;
        assert!(matches!(outcome.failure, Some(ExecFailure::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_zero_output_escalates_slippage() {
        let quotes = FakeQuoteService::new()
            .with_quote_result(Ok(FakeQuoteService::quote(
                &QuoteParams {
                    input_mint: SOL_MINT.into(),
                    output_mint: MINT.into(),
                    amount: SOL / 10,
                    slippage_bps: 300,
                },
                0,
            )))
            .with_out_amount(MINT, 5_000);
        let h = harness(quotes, FakeChain::new());

        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, SOL / 10)).await;
        assert!(outcome.is_success());
        let rungs: Vec<u16> = h.quotes.quote_calls().iter().map(|p| p.slippage_bps).collect();
        assert_eq!(rungs, vec![300, 500]);
        assert_eq!(outcome.fill.unwrap().slippage_bps, 500);
    }

    #[tokio::test]
    async fn test_no_route_is_terminal() {
        let h = harness(FakeQuoteService::new().with_unroutable(MINT), FakeChain::new());
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, SOL / 10)).await;
        assert_eq!(outcome.failure, Some(ExecFailure::NoRoute(MINT.to_string())));
        // no retries and no escalation
        assert_eq!(h.quotes.quote_calls().len(), 1);
        assert!(h.quotes.swap_calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_quote_errors_retried() {
        let quotes = FakeQuoteService::new()
            .with_quote_result(Err(QuoteError::RateLimited))
            .with_quote_result(Err(QuoteError::Network("reset".into())));
        let h = harness(quotes, FakeChain::new());
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, SOL / 10)).await;
        assert!(outcome.is_success());
        assert_eq!(h.quotes.quote_calls().len(), 3);
        assert!(h.quotes.quote_calls().iter().all(|p| p.slippage_bps == 300));
    }

    #[tokio::test]
    async fn test_confirm_failure_never_success() {
        let chain = FakeChain::new().with_confirm_outcome(ConfirmOutcome::Expired);
        let h = harness(FakeQuoteService::new(), chain);
        let outcome = h.executor.swap(&SwapRequest::buy(&h.wallet, MINT, SOL / 10)).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.tx_hash.is_some());
        assert_eq!(outcome.failure, Some(ExecFailure::Expired));
    }

    #[tokio::test]
    async fn test_sell_skips_sol_caps() {
        let h = harness(FakeQuoteService::new().with_out_amount(SOL_MINT, SOL / 2), FakeChain::new());
        h.chain.set_balance(&h.wallet, 6_000_000);
        let outcome = h
            .executor
            .swap(&SwapRequest::sell(&h.wallet, MINT, 12_500_000).with_slippage(300))
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.fill.unwrap().out_amount, SOL / 2);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let h = harness(FakeQuoteService::new(), FakeChain::new());
        let stranger = Keypair::new().pubkey().to_string();
        let outcome = h.executor.swap(&SwapRequest::buy(&stranger, MINT, SOL / 10)).await;
        assert!(matches!(outcome.failure, Some(ExecFailure::WalletNotFound(_))));
        assert!(h.quotes.quote_calls().is_empty());
    }
}
