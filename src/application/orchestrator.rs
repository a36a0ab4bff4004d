//! Trade Orchestrator
//!
//! Runs one trade instruction through RESOLVE -> SAFETY_CHECK -> LIMIT_CHECK
//! -> EXECUTE -> RECORD. Nothing is retried at this level; the executors own
//! sub-step retries and a caller retries by sending a new instruction.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

use super::execution::TxOutcome;
use super::resolver::TokenResolver;
use super::safety::SafetyEvaluator;
use super::swap_executor::{SwapExecutor, SwapRequest};
use crate::domain::portfolio::realized_on;
use crate::domain::position::{ExitReason, Position, PositionExit};
use crate::domain::risk::{dynamic_slippage_bps, RiskParams, SELL_SLIPPAGE_BPS};
use crate::domain::safety::SafetyAssessment;
use crate::domain::token::{lamports_to_sol, sol_to_lamports, to_ui_amount, TokenIdentity, SOL_MINT};
use crate::domain::trade::{
    ExecutionStatus, SafetySnapshot, TradeAmount, TradeInstruction, TradeIntent, TradeRecord, TradeSide,
};
use crate::ports::chain::ChainRpc;
use crate::ports::market_data::RateSource;
use crate::ports::storage::{PositionStore, PositionStoreError, TradeLedger};

/// Conservative SOL/USD estimate used when the rate source is down
pub const FALLBACK_SOL_USD: f64 = 150.0;

/// Per-wallet execution locks, shared by every service that spends from a wallet
#[derive(Default)]
pub struct WalletLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `wallet`. Released when the guard drops.
    pub async fn acquire(&self, wallet: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(wallet.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Why a SELL runs, and which position an automated exit is for
#[derive(Debug, Clone, Copy)]
struct ExitTarget<'a> {
    reason: ExitReason,
    position_id: Option<&'a str>,
}

impl ExitTarget<'_> {
    fn manual() -> Self {
        Self {
            reason: ExitReason::Manual,
            position_id: None,
        }
    }
}

/// Position lifecycle notifications
#[derive(Debug, Clone)]
pub enum TradeEvent {
    PositionOpened(Position),
    PositionClosed(Position),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub risk: RiskParams,
    pub fallback_sol_usd: f64,
    pub sell_slippage_bps: u16,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            risk: RiskParams::default(),
            fallback_sol_usd: FALLBACK_SOL_USD,
            sell_slippage_bps: SELL_SLIPPAGE_BPS,
        }
    }
}

/// Result of one `process` call. `status` is authoritative.
#[derive(Debug, Clone, Serialize)]
pub struct TradeOutcome {
    pub status: ExecutionStatus,
    pub intent: TradeIntent,
    pub token: Option<TokenIdentity>,
    pub tx_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
    /// Risk factors behind a block
    pub risks: Vec<String>,
    pub safety: Option<SafetySnapshot>,
    pub amount_sol: f64,
    pub amount_usd: f64,
    pub amount_tokens: f64,
    pub price_usd: Option<f64>,
    pub position_id: Option<String>,
    pub pnl_pct: Option<f64>,
    /// Ledger record written for this call, if any
    pub record_id: Option<String>,
    /// The query matched more than one token
    pub duplicates: bool,
}

impl TradeOutcome {
    fn new(status: ExecutionStatus, intent: TradeIntent) -> Self {
        Self {
            status,
            intent,
            token: None,
            tx_hash: None,
            explorer_url: None,
            error: None,
            risks: Vec::new(),
            safety: None,
            amount_sol: 0.0,
            amount_usd: 0.0,
            amount_tokens: 0.0,
            price_usd: None,
            position_id: None,
            pnl_pct: None,
            record_id: None,
            duplicates: false,
        }
    }

    /// Terminal failure before anything was executed or recorded
    fn rejected(intent: TradeIntent, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(ExecutionStatus::Failed, intent)
        }
    }

    fn with_token(mut self, token: &TokenIdentity, duplicates: bool) -> Self {
        self.token = Some(token.clone());
        self.duplicates = duplicates;
        self
    }

    fn with_tx(mut self, tx: &TxOutcome) -> Self {
        self.tx_hash = tx.tx_hash.clone();
        self.explorer_url = tx.explorer_url.clone();
        self.error = tx.error.clone();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

pub struct TradeOrchestrator {
    resolver: Arc<TokenResolver>,
    safety: Arc<SafetyEvaluator>,
    swaps: Arc<SwapExecutor>,
    chain: Arc<dyn ChainRpc>,
    rates: Arc<dyn RateSource>,
    ledger: Arc<dyn TradeLedger>,
    positions: Arc<dyn PositionStore>,
    locks: Arc<WalletLocks>,
    events: broadcast::Sender<TradeEvent>,
    config: OrchestratorConfig,
}

impl TradeOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: Arc<TokenResolver>,
        safety: Arc<SafetyEvaluator>,
        swaps: Arc<SwapExecutor>,
        chain: Arc<dyn ChainRpc>,
        rates: Arc<dyn RateSource>,
        ledger: Arc<dyn TradeLedger>,
        positions: Arc<dyn PositionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            resolver,
            safety,
            swaps,
            chain,
            rates,
            ledger,
            positions,
            locks: Arc::new(WalletLocks::new()),
            events,
            config,
        }
    }

    /// Share execution locks with other wallet-spending services
    pub fn with_locks(mut self, locks: Arc<WalletLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> Arc<WalletLocks> {
        self.locks.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.events.subscribe()
    }

    pub async fn process(&self, wallet: &str, instruction: &TradeInstruction) -> TradeOutcome {
        self.run(wallet, instruction, ExitTarget::manual()).await
    }

    /// Sell 100% of an open position's token (automated exits). The outcome's
    /// PnL is that position's, measured against its own entry price.
    pub async fn exit_position(&self, position: &Position, reason: ExitReason) -> TradeOutcome {
        let instruction = TradeInstruction::sell_pct(&position.token.mint, 100.0);
        let target = ExitTarget {
            reason,
            position_id: Some(position.id.as_str()),
        };
        self.run(&position.wallet, &instruction, target).await
    }

    async fn run(&self, wallet: &str, ix: &TradeInstruction, target: ExitTarget<'_>) -> TradeOutcome {
        let intent = ix.intent;
        tracing::info!("{:?} '{}' for {}", intent, ix.token_query, wallet);

        // RESOLVE
        let resolution = match self.resolver.resolve(&ix.token_query).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Resolution failed: {}", e);
                return TradeOutcome::rejected(intent, e.to_string());
            }
        };
        let token = resolution.token;
        if token.mint == SOL_MINT {
            return TradeOutcome::rejected(intent, "Cannot trade SOL against itself").with_token(&token, false);
        }

        // SAFETY_CHECK
        let safety = self.safety.evaluate(&token.mint, None).await;
        if safety.is_blocked() {
            tracing::warn!("Blocked {} ({}): {:?}", token.symbol, token.mint, safety.risks);
            let record = TradeRecord::new(wallet, token.clone(), intent.into(), ExecutionStatus::Blocked)
                .with_error(Some(format!("Blocked by safety check (score {})", safety.score)))
                .with_safety(Some(&safety));
            let mut outcome = TradeOutcome::new(ExecutionStatus::Blocked, intent).with_token(&token, resolution.duplicates);
            outcome.error = record.error.clone();
            outcome.risks = safety.risks.clone();
            outcome.safety = Some(SafetySnapshot::from(&safety));
            outcome.record_id = self.record(&record).await;
            return outcome;
        }

        // LIMIT_CHECK and EXECUTE never race another spend from the same wallet
        let _guard = self.locks.acquire(wallet).await;
        let mut outcome = match intent {
            TradeIntent::Buy => self.buy(wallet, ix, &token, &safety).await,
            TradeIntent::Sell => self.sell(wallet, ix, &token, &safety, target).await,
        };
        outcome.token = Some(token);
        outcome.duplicates = resolution.duplicates;
        outcome.safety = Some(SafetySnapshot::from(&safety));
        outcome
    }

    async fn buy(&self, wallet: &str, ix: &TradeInstruction, token: &TokenIdentity, safety: &SafetyAssessment) -> TradeOutcome {
        let intent = TradeIntent::Buy;
        let Some(amount) = ix.amount() else {
            return TradeOutcome::rejected(intent, "No buy amount given");
        };

        let balance = match self.chain.get_balance(wallet).await {
            Ok(b) => lamports_to_sol(b),
            Err(e) => return TradeOutcome::rejected(intent, format!("Balance lookup failed: {}", e)),
        };
        let rate = self.sol_usd().await;
        let (amount_sol, amount_usd) = match amount {
            TradeAmount::Sol(sol) => (sol, sol * rate),
            TradeAmount::Usd(usd) => (usd / rate, usd),
            TradeAmount::Pct(pct) => {
                let sol = balance * pct / 100.0;
                (sol, sol * rate)
            }
        };

        if let Err(violation) = self.check_limits(wallet, amount_sol, balance, rate).await {
            tracing::warn!("Limit check rejected buy: {}", violation);
            return TradeOutcome::rejected(intent, violation);
        }

        let slippage = dynamic_slippage_bps(amount_usd);
        let request = SwapRequest::buy(wallet, &token.mint, sol_to_lamports(amount_sol)).with_slippage(slippage);
        let tx = self.swaps.swap(&request).await;

        let mut outcome = TradeOutcome::new(tx.status, intent).with_tx(&tx);
        outcome.amount_sol = amount_sol;
        outcome.amount_usd = amount_usd;

        if let (true, Some(fill)) = (tx.is_success(), tx.fill.as_ref()) {
            let decimals = self.decimals_for(wallet, token).await;
            let tokens = to_ui_amount(fill.out_amount, decimals);
            outcome.amount_tokens = tokens;
            if tokens > 0.0 {
                let entry = amount_usd / tokens;
                outcome.price_usd = Some(entry);
                outcome.position_id = self.open_position(wallet, ix, token, decimals, entry, &outcome, &tx).await;
            }
        }

        let mut record = TradeRecord::new(wallet, token.clone(), TradeSide::Buy, outcome.status)
            .with_amounts(outcome.amount_sol, outcome.amount_usd, outcome.amount_tokens)
            .with_tx(tx.tx_hash.clone())
            .with_error(tx.error.clone())
            .with_safety(Some(safety));
        record.price_usd = outcome.price_usd;
        outcome.record_id = self.record(&record).await;
        outcome
    }

    async fn sell(
        &self,
        wallet: &str,
        ix: &TradeInstruction,
        token: &TokenIdentity,
        safety: &SafetyAssessment,
        target: ExitTarget<'_>,
    ) -> TradeOutcome {
        let intent = TradeIntent::Sell;
        let pct = ix.amount_pct.unwrap_or(100.0);
        if !(pct > 0.0 && pct <= 100.0) {
            return TradeOutcome::rejected(intent, format!("Sell percentage must be in (0, 100], got {}", pct));
        }

        let holding = match self.chain.get_token_balance(wallet, &token.mint).await {
            Ok(Some(h)) if h.amount > 0 => h,
            Ok(_) => return TradeOutcome::rejected(intent, format!("No {} holdings to sell", token.symbol)),
            Err(e) => return TradeOutcome::rejected(intent, format!("Token balance lookup failed: {}", e)),
        };
        let full = pct >= 100.0;
        let units = if full {
            holding.amount
        } else {
            (holding.amount as f64 * pct / 100.0).floor() as u64
        };
        let tokens_sold = to_ui_amount(units, holding.decimals);

        let request = SwapRequest::sell(wallet, &token.mint, units).with_slippage(self.config.sell_slippage_bps);
        let tx = self.swaps.swap(&request).await;

        let mut outcome = TradeOutcome::new(tx.status, intent).with_tx(&tx);
        outcome.amount_tokens = tokens_sold;

        if let (true, Some(fill)) = (tx.is_success(), tx.fill.as_ref()) {
            let rate = self.sol_usd().await;
            outcome.amount_sol = lamports_to_sol(fill.out_amount);
            outcome.amount_usd = outcome.amount_sol * rate;
            if tokens_sold > 0.0 {
                outcome.price_usd = Some(outcome.amount_usd / tokens_sold);
            }
            if let (true, Some(exit_price)) = (full, outcome.price_usd) {
                if let Some(closed) = self.close_positions(wallet, &token.mint, exit_price, &tx, target).await {
                    outcome.position_id = Some(closed.id.clone());
                    outcome.pnl_pct = closed.pnl_pct;
                }
            }
        }

        let mut record = TradeRecord::new(wallet, token.clone(), TradeSide::Sell, outcome.status)
            .with_amounts(outcome.amount_sol, outcome.amount_usd, outcome.amount_tokens)
            .with_tx(tx.tx_hash.clone())
            .with_error(tx.error.clone())
            .with_safety(Some(safety));
        record.price_usd = outcome.price_usd;
        record.pnl_pct = outcome.pnl_pct;
        outcome.record_id = self.record(&record).await;
        outcome
    }

    async fn check_limits(&self, wallet: &str, amount_sol: f64, balance_sol: f64, rate: f64) -> Result<(), String> {
        let risk = &self.config.risk;
        risk.validate_position_size(amount_sol, balance_sol)
            .map_err(|v| v.to_string())?;

        let positions = self
            .positions
            .for_wallet(wallet)
            .await
            .map_err(|e| format!("Position lookup failed: {}", e))?;
        let open = positions.iter().filter(|p| p.is_open()).count();
        risk.validate_open_positions(open).map_err(|v| v.to_string())?;

        let realized = realized_on(&positions, Utc::now().date_naive());
        risk.validate_daily_drawdown(realized, balance_sol * rate)
            .map_err(|v| v.to_string())
    }

    async fn sol_usd(&self) -> f64 {
        match self.rates.sol_usd().await {
            Ok(rate) if rate > 0.0 => rate,
            Ok(rate) => {
                tracing::warn!("Ignoring non-positive SOL/USD rate {}", rate);
                self.config.fallback_sol_usd
            }
            Err(e) => {
                tracing::warn!("SOL/USD rate unavailable ({}), using ${}", e, self.config.fallback_sol_usd);
                self.config.fallback_sol_usd
            }
        }
    }

    /// Registry decimals, or the on-chain account's when the token is unlisted
    async fn decimals_for(&self, wallet: &str, token: &TokenIdentity) -> u8 {
        if !token.is_unknown() {
            return token.decimals;
        }
        match self.chain.get_token_balance(wallet, &token.mint).await {
            Ok(Some(holding)) => holding.decimals,
            _ => token.decimals,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_position(
        &self,
        wallet: &str,
        ix: &TradeInstruction,
        token: &TokenIdentity,
        decimals: u8,
        entry: f64,
        outcome: &TradeOutcome,
        tx: &TxOutcome,
    ) -> Option<String> {
        let token = TokenIdentity { decimals, ..token.clone() };
        let stop_loss = ix.stop_loss_pct.unwrap_or(self.config.risk.stop_loss_pct);
        let take_profit = ix.take_profit_pct.unwrap_or(self.config.risk.take_profit_pct);

        let position = match Position::open(wallet, token, entry, outcome.amount_tokens, outcome.amount_sol, outcome.amount_usd) {
            Ok(p) => p.with_exits(Some(stop_loss), Some(take_profit)),
            Err(e) => {
                tracing::error!("Could not open position: {}", e);
                return None;
            }
        };
        let position = match &tx.tx_hash {
            Some(hash) => position.with_open_tx(hash),
            None => position,
        };

        if let Err(e) = self.positions.insert(&position).await {
            tracing::error!("Failed to persist position {}: {}", position.id, e);
            return None;
        }
        tracing::info!(
            "Opened position {} in {}: {:.4} @ ${:.6} (SL {}%, TP {}%)",
            position.id,
            position.token.symbol,
            position.quantity,
            entry,
            stop_loss,
            take_profit
        );
        let id = position.id.clone();
        // nobody listening is fine
        let _ = self.events.send(TradeEvent::PositionOpened(position));
        Some(id)
    }

    /// Close every OPEN position on `mint` after a 100% sell left none of it
    /// in the wallet. Returns the position the sale is attributed to: the
    /// exit's target, or the newest one for a manual sell.
    async fn close_positions(
        &self,
        wallet: &str,
        mint: &str,
        exit_price: f64,
        tx: &TxOutcome,
        target: ExitTarget<'_>,
    ) -> Option<Position> {
        let open: Vec<Position> = match self.positions.open_positions(Some(wallet)).await {
            Ok(positions) => positions.into_iter().filter(|p| p.token.mint == mint).collect(),
            Err(e) => {
                tracing::error!("Position lookup failed: {}", e);
                return None;
            }
        };
        if open.is_empty() {
            tracing::debug!("No open position for {} to close", mint);
            return None;
        }
        let primary_id = match target.position_id {
            Some(id) => Some(id.to_string()),
            None => match self.positions.latest_open(wallet, mint).await {
                Ok(latest) => latest.map(|p| p.id),
                Err(e) => {
                    tracing::warn!("Latest position lookup failed: {}", e);
                    None
                }
            },
        };

        let mut primary = None;
        for position in open {
            let exit = PositionExit {
                exit_price,
                tx_hash: tx.tx_hash.clone(),
                reason: target.reason,
                closed_at: Utc::now(),
            };
            let Some(closed) = self.close_one(&position.id, exit).await else {
                continue;
            };
            if primary_id.as_deref() == Some(closed.id.as_str()) {
                primary = Some(closed);
            }
        }
        if primary.is_none() {
            if let Some(id) = target.position_id {
                tracing::warn!("Exit target {} was not open at sale time", id);
            }
        }
        primary
    }

    async fn close_one(&self, id: &str, exit: PositionExit) -> Option<Position> {
        let (reason, exit_price) = (exit.reason, exit.exit_price);
        match self.positions.close(id, exit).await {
            Ok(closed) => {
                tracing::info!(
                    "Closed position {} ({}) at ${:.6}: {:.2}%",
                    closed.id,
                    reason.as_str(),
                    exit_price,
                    closed.pnl_pct.unwrap_or(0.0)
                );
                // nobody listening is fine
                let _ = self.events.send(TradeEvent::PositionClosed(closed.clone()));
                Some(closed)
            }
            Err(PositionStoreError::AlreadyClosed(id)) => {
                tracing::warn!("Position {} was already closed", id);
                None
            }
            Err(e) => {
                tracing::error!("Failed to close position {}: {}", id, e);
                None
            }
        }
    }

    /// Append to the ledger. A write failure is logged, never turned into a trade failure.
    async fn record(&self, record: &TradeRecord) -> Option<String> {
        match self.ledger.append(record).await {
            Ok(()) => Some(record.id.clone()),
            Err(e) => {
                tracing::error!("Ledger write failed for {}: {}", record, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::execution::ExecutorConfig;
    use crate::application::retry::RetryPolicy;
    use crate::domain::safety::SecurityFacts;
    use crate::domain::token::TokenCandidate;
    use crate::ports::mocks::{
        FakeChain, FakeQuoteService, FakeRegistry, FakeSecurityService, FixedRate, InMemoryKeyStore,
        InMemoryLedger, InMemoryPositionStore,
    };
    use approx::assert_relative_eq;
    use solana_sdk::signature::{Keypair, Signer};
    use std::time::Duration;

    const MINT: &str = "MintX";

    struct Harness {
        orchestrator: TradeOrchestrator,
        wallet: String,
        chain: FakeChain,
        quotes: FakeQuoteService,
        ledger: InMemoryLedger,
        positions: InMemoryPositionStore,
    }

    fn harness(facts: SecurityFacts) -> Harness {
        let kp = Keypair::new();
        let wallet = kp.pubkey().to_string();
        let chain = FakeChain::new().with_balance(&wallet, 10_000_000_000);
        let quotes = FakeQuoteService::new().with_out_amount(MINT, 12_500_000);
        let registry = FakeRegistry::new().with_strict(TokenCandidate {
            address: MINT.to_string(),
            symbol: "X".to_string(),
            name: "Token X".to_string(),
            decimals: 6,
            liquidity: 1_000.0,
            verified: true,
        });
        let security = FakeSecurityService::new().with_facts(MINT, facts);
        let ledger = InMemoryLedger::new();
        let positions = InMemoryPositionStore::new();

        let config = ExecutorConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            confirm_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let quotes_arc = Arc::new(quotes.clone());
        let swaps = SwapExecutor::with_config(
            quotes_arc.clone(),
            Arc::new(chain.clone()),
            Arc::new(InMemoryKeyStore::new().with_keypair("u1", &kp)),
            config,
        );
        let orchestrator = TradeOrchestrator::new(
            Arc::new(TokenResolver::new(Arc::new(registry), quotes_arc)),
            Arc::new(SafetyEvaluator::new(Arc::new(security))),
            Arc::new(swaps),
            Arc::new(chain.clone()),
            Arc::new(FixedRate(Some(150.0))),
            Arc::new(ledger.clone()),
            Arc::new(positions.clone()),
            OrchestratorConfig::default(),
        );
        Harness {
            orchestrator,
            wallet,
            chain,
            quotes,
            ledger,
            positions,
        }
    }

    fn safe() -> SecurityFacts {
        SecurityFacts {
            top10_holder_pct: 20.0,
            total_liquidity_usd: 50_000.0,
            lp_locked: true,
            holder_count: 900,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_buy_opens_position() {
        let h = harness(safe());
        let mut events = h.orchestrator.subscribe();
        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("X", 50.0)).await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_relative_eq!(outcome.amount_sol, 50.0 / 150.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.amount_tokens, 12.5, epsilon = 1e-12);
        assert_relative_eq!(outcome.price_usd.unwrap(), 4.0, epsilon = 1e-12);
        // $50 sits in the 300 bps band
        assert_eq!(h.quotes.quote_calls().last().unwrap().slippage_bps, 300);

        let positions = h.positions.all();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].stop_loss_pct, Some(20.0));
        assert_eq!(positions[0].take_profit_pct, Some(100.0));
        assert!(matches!(events.try_recv(), Ok(TradeEvent::PositionOpened(_))));

        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].side, TradeSide::Buy);
        assert_eq!(records[0].tx_hash, outcome.tx_hash);
    }

    #[tokio::test]
    async fn test_blocked_token_never_swaps() {
        let h = harness(SecurityFacts {
            has_transfer_hook: true,
            ..Default::default()
        });
        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("X", 50.0)).await;

        assert_eq!(outcome.status, ExecutionStatus::Blocked);
        assert!(!outcome.risks.is_empty());
        assert!(h.quotes.swap_calls().is_empty());
        assert_eq!(h.chain.send_calls(), 0);

        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Blocked);
        assert_eq!(records[0].amount_sol, 0.0);
    }

    #[tokio::test]
    async fn test_position_cap_rejects_without_record() {
        let h = harness(safe());
        // 5% of 10 SOL is 0.5 SOL
        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::buy_sol("X", 0.6)).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.error.unwrap().contains("max position size"));
        assert!(h.ledger.records().is_empty());
        assert!(h.quotes.swap_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_token_fails_without_record() {
        let h = harness(safe());
        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("NOPE", 10.0)).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.token.is_none());
        assert!(h.ledger.records().is_empty());
    }

    #[tokio::test]
    async fn test_full_sell_closes_position() {
        let h = harness(safe());
        h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("X", 50.0)).await;
        h.chain.set_token_balance(&h.wallet, MINT, 12_500_000, 6);
        // 12.5 tokens at $4.80 = $60 = 0.4 SOL
        h.quotes.set_out_amount(SOL_MINT, 400_000_000);

        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::sell_pct("X", 100.0)).await;
        assert!(outcome.is_success());
        assert_relative_eq!(outcome.price_usd.unwrap(), 4.8, epsilon = 1e-9);
        assert_relative_eq!(outcome.pnl_pct.unwrap(), 20.0, epsilon = 1e-9);
        assert!(h.positions.all().iter().all(|p| !p.is_open()));
        assert_eq!(h.ledger.records().len(), 2);
    }

    #[tokio::test]
    async fn test_full_sell_closes_every_position_on_the_mint() {
        let h = harness(safe());
        let first = h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("X", 50.0)).await;
        // 25 tokens for $50 is an entry of $2
        h.quotes.set_out_amount(MINT, 25_000_000);
        let second = h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("X", 50.0)).await;
        assert_eq!(h.positions.all().len(), 2);

        h.chain.set_token_balance(&h.wallet, MINT, 37_500_000, 6);
        // 37.5 tokens for 0.8 SOL = $120, i.e. $3.20 each
        h.quotes.set_out_amount(SOL_MINT, 800_000_000);
        let mut events = h.orchestrator.subscribe();
        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::sell_pct("X", 100.0)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.position_id, second.position_id);
        assert_relative_eq!(outcome.pnl_pct.unwrap(), 60.0, epsilon = 1e-6);

        let positions = h.positions.all();
        assert!(positions.iter().all(|p| !p.is_open()));
        let older = positions.iter().find(|p| Some(&p.id) == first.position_id.as_ref()).unwrap();
        assert_relative_eq!(older.pnl_pct.unwrap(), -20.0, epsilon = 1e-6);
        assert_eq!(older.exit_reason, Some(ExitReason::Manual));

        let closed_events = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, TradeEvent::PositionClosed(_)))
            .count();
        assert_eq!(closed_events, 2);
        // one sale, one record
        assert_eq!(h.ledger.records().len(), 3);
    }

    #[tokio::test]
    async fn test_partial_sell_keeps_position_open() {
        let h = harness(safe());
        h.orchestrator.process(&h.wallet, &TradeInstruction::buy_usd("X", 50.0)).await;
        h.chain.set_token_balance(&h.wallet, MINT, 12_500_000, 6);

        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::sell_pct("X", 50.0)).await;
        assert!(outcome.is_success());
        assert_relative_eq!(outcome.amount_tokens, 6.25, epsilon = 1e-12);
        assert!(outcome.pnl_pct.is_none());
        assert!(h.positions.all()[0].is_open());
    }

    #[tokio::test]
    async fn test_sell_without_holdings() {
        let h = harness(safe());
        let outcome = h.orchestrator.process(&h.wallet, &TradeInstruction::sell_pct("X", 100.0)).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.error.unwrap().contains("No X holdings"));
        assert!(h.ledger.records().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_locks_serialize() {
        let locks = Arc::new(WalletLocks::new());
        let guard = locks.acquire("W").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire("W").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        // a different wallet is not blocked
        let _g2 = locks.acquire("V").await;
        drop(guard);
        waiter.await.unwrap();
    }
}
