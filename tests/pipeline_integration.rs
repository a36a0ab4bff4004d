//! Trading Pipeline Integration Tests
//!
//! Drives the real resolver, safety evaluator, executors, orchestrator,
//! price feed and automation engine against the in-memory port fakes:
//! 1. BUY sizing, position creation and the ledger record
//! 2. Stop-loss exit through the polling price feed
//! 3. Round-trip PnL on manual sells
//! 4. Failure paths: blocked tokens, confirmation timeouts, transient sends
//!
//! All tests are deterministic (no real network calls).

use approx::assert_relative_eq;
use serde_json::Value;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use std::time::Duration;

use memeterm::application::{
    AutomationEngine, ExecutorConfig, ExitFailurePolicy, OrchestratorConfig, PriceFeed, RetryPolicy,
    SafetyEvaluator, SwapExecutor, TokenResolver, TradeOrchestrator,
};
use memeterm::domain::playbook::STOP_LOSS_GUARD;
use memeterm::domain::position::PositionStatus;
use memeterm::domain::safety::SecurityFacts;
use memeterm::domain::token::{TokenCandidate, SOL_MINT};
use memeterm::domain::trade::{ExecutionStatus, TradeInstruction, TradeSide};
use memeterm::ports::mocks::{
    FakeChain, FakePriceSource, FakeQuoteService, FakeRegistry, FakeSecurityService, FixedRate,
    InMemoryAutomationStore, InMemoryKeyStore, InMemoryLedger, InMemoryPositionStore,
};

// ============================================================================
// Test Fixtures
// ============================================================================

const MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
/// What the 12.5 tokens fetch at the $4.00 entry price
const ENTRY_VALUE_LAMPORTS: u64 = 333_333_333;

struct Pipeline {
    orchestrator: Arc<TradeOrchestrator>,
    engine: AutomationEngine,
    feed: PriceFeed,
    wallet: String,
    chain: FakeChain,
    quotes: FakeQuoteService,
    prices: FakePriceSource,
    ledger: InMemoryLedger,
    positions: InMemoryPositionStore,
    store: InMemoryAutomationStore,
}

fn candidate(address: &str, symbol: &str, liquidity: f64) -> TokenCandidate {
    TokenCandidate {
        address: address.to_string(),
        symbol: symbol.to_string(),
        name: format!("{} Token", symbol),
        decimals: 6,
        liquidity,
        verified: true,
    }
}

fn safe_facts() -> SecurityFacts {
    SecurityFacts {
        top10_holder_pct: 20.0,
        total_liquidity_usd: 50_000.0,
        lp_locked: true,
        holder_count: 900,
        ..Default::default()
    }
}

struct Options {
    facts: SecurityFacts,
    send_failures: u32,
    confirm_hangs: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            facts: safe_facts(),
            send_failures: 0,
            confirm_hangs: false,
        }
    }
}

fn pipeline(options: Options) -> Pipeline {
    let kp = Keypair::new();
    let wallet = kp.pubkey().to_string();

    let mut chain = FakeChain::new()
        .with_balance(&wallet, 10_000_000_000)
        .with_send_failures(options.send_failures);
    if options.confirm_hangs {
        chain = chain.with_confirm_hang();
    }
    // 0.3333 SOL buys 12.5 tokens at 6 decimals
    let quotes = FakeQuoteService::new().with_out_amount(MINT, 12_500_000);
    let registry = FakeRegistry::new().with_strict(candidate(MINT, "BONK", 1_000_000.0));
    let security = FakeSecurityService::new().with_facts(MINT, options.facts);
    let prices = FakePriceSource::new();
    let ledger = InMemoryLedger::new();
    let positions = InMemoryPositionStore::new();
    let store = InMemoryAutomationStore::new();

    let quotes_arc = Arc::new(quotes.clone());
    let swaps = SwapExecutor::with_config(
        quotes_arc.clone(),
        Arc::new(chain.clone()),
        Arc::new(InMemoryKeyStore::new().with_keypair("u1", &kp)),
        ExecutorConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            confirm_timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let orchestrator = Arc::new(TradeOrchestrator::new(
        Arc::new(TokenResolver::new(Arc::new(registry), quotes_arc)),
        Arc::new(SafetyEvaluator::new(Arc::new(security))),
        Arc::new(swaps),
        Arc::new(chain.clone()),
        Arc::new(FixedRate(Some(150.0))),
        Arc::new(ledger.clone()),
        Arc::new(positions.clone()),
        OrchestratorConfig::default(),
    ));
    let feed = PriceFeed::with_interval(Arc::new(prices.clone()), Duration::from_millis(20));
    let engine = AutomationEngine::new(
        orchestrator.clone(),
        feed.clone(),
        Arc::new(positions.clone()),
        Arc::new(store.clone()),
        ExitFailurePolicy::Rewatch,
    );

    Pipeline {
        orchestrator,
        engine,
        feed,
        wallet,
        chain,
        quotes,
        prices,
        ledger,
        positions,
        store,
    }
}

impl Pipeline {
    /// The swap fake does not move balances; mirror a filled buy on chain
    fn credit_tokens(&self) {
        self.chain.set_token_balance(&self.wallet, MINT, 12_500_000, 6);
    }
}

/// Poll `check` until it holds or two seconds pass
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// BUY
// ============================================================================

#[tokio::test]
async fn test_buy_50_usd_opens_position_at_4() {
    let p = pipeline(Options::default());
    let outcome = p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;

    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.token.as_ref().map(|t| t.mint.as_str()), Some(MINT));
    assert_relative_eq!(outcome.amount_sol, 1.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(outcome.amount_tokens, 12.5, epsilon = 1e-12);
    assert_relative_eq!(outcome.price_usd.unwrap(), 4.0, epsilon = 1e-12);
    assert!(outcome.tx_hash.is_some());

    let positions = p.positions.all();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].status, PositionStatus::Open);
    assert_relative_eq!(positions[0].entry_price, 4.0, epsilon = 1e-12);

    let records = p.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].side, TradeSide::Buy);
    assert_eq!(records[0].status, ExecutionStatus::Success);
    assert_eq!(records[0].tx_hash, outcome.tx_hash);
}

#[tokio::test]
async fn test_blocked_token_never_reaches_the_chain() {
    let p = pipeline(Options {
        facts: SecurityFacts {
            has_transfer_hook: true,
            ..safe_facts()
        },
        ..Default::default()
    });
    let outcome = p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;

    assert_eq!(outcome.status, ExecutionStatus::Blocked);
    assert!(!outcome.risks.is_empty());
    assert!(p.quotes.swap_calls().is_empty());
    assert_eq!(p.chain.send_calls(), 0);
    assert!(p.positions.all().is_empty());

    let records = p.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Blocked);
}

#[tokio::test]
async fn test_confirm_timeout_fails_with_hash() {
    let p = pipeline(Options {
        confirm_hangs: true,
        ..Default::default()
    });
    let outcome = p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;

    assert_eq!(outcome.status, ExecutionStatus::Failed);
    let hash = outcome.tx_hash.clone().expect("hash survives the timeout");
    assert!(outcome.explorer_url.unwrap().ends_with(&hash));
    assert!(p.positions.all().is_empty());

    let records = p.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Failed);
    assert_eq!(records[0].tx_hash.as_deref(), Some(hash.as_str()));
}

#[tokio::test]
async fn test_transient_send_failures_write_one_record() {
    let p = pipeline(Options {
        send_failures: 2,
        ..Default::default()
    });
    let outcome = p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;

    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(p.chain.send_calls(), 3);
    assert_eq!(p.ledger.records().len(), 1);
    assert_eq!(p.positions.all().len(), 1);
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_resolver_is_deterministic_across_duplicates() {
    let registry = FakeRegistry::new()
        .with_strict(candidate("PepeLow1111111111111111111111111111111111", "PEPE", 5_000.0))
        .with_strict(candidate("PepeHigh111111111111111111111111111111111", "PEPE", 900_000.0))
        .with_strict(candidate("PepeMid11111111111111111111111111111111111", "PEPE", 40_000.0));
    let resolver = TokenResolver::new(Arc::new(registry), Arc::new(FakeQuoteService::new()));

    let mut chosen = Vec::new();
    for _ in 0..3 {
        let resolution = resolver.resolve("pepe").await.unwrap();
        assert!(resolution.duplicates);
        assert_eq!(resolution.alternatives.len(), 2);
        chosen.push(resolution.token.mint);
    }
    assert!(chosen.iter().all(|m| m == "PepeHigh111111111111111111111111111111111"));
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn test_sell_at_entry_price_is_flat() {
    let p = pipeline(Options::default());
    p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;
    p.credit_tokens();
    p.quotes.set_out_amount(SOL_MINT, ENTRY_VALUE_LAMPORTS);

    let outcome = p.orchestrator.process(&p.wallet, &TradeInstruction::sell_pct("BONK", 100.0)).await;
    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_relative_eq!(outcome.pnl_pct.unwrap(), 0.0, epsilon = 1e-4);

    let closed = &p.positions.all()[0];
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_relative_eq!(closed.pnl_pct.unwrap(), 0.0, epsilon = 1e-4);
    assert_eq!(p.ledger.records().len(), 2);
}

#[tokio::test]
async fn test_sell_at_4_80_closes_plus_20() {
    let p = pipeline(Options::default());
    p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;
    p.credit_tokens();
    // 0.4 SOL = $60 for 12.5 tokens
    p.quotes.set_out_amount(SOL_MINT, 400_000_000);

    let outcome = p.orchestrator.process(&p.wallet, &TradeInstruction::sell_pct("BONK", 100.0)).await;
    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_relative_eq!(outcome.price_usd.unwrap(), 4.8, epsilon = 1e-9);
    assert_relative_eq!(outcome.pnl_pct.unwrap(), 20.0, epsilon = 1e-9);

    let sell = p.ledger.records().into_iter().find(|r| r.side == TradeSide::Sell).unwrap();
    assert_relative_eq!(sell.pnl_pct.unwrap(), 20.0, epsilon = 1e-9);
}

// ============================================================================
// Automation
// ============================================================================

#[tokio::test]
async fn test_stop_loss_through_price_feed_closes_once_at_minus_20() {
    let p = pipeline(Options::default());
    p.engine.activate("u1", STOP_LOSS_GUARD, &Value::Null).await.unwrap();
    p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;
    p.credit_tokens();
    // 12.5 tokens for 0.2667 SOL = $40, i.e. $3.20 per token
    p.quotes.set_out_amount(SOL_MINT, 266_666_667);
    p.prices.set_price(MINT, 3.2);

    assert_eq!(p.engine.start_monitoring("u1", &p.wallet).await.unwrap(), 1);

    let positions = p.positions.clone();
    let closed = eventually(|| {
        let positions = positions.clone();
        async move { positions.all()[0].status == PositionStatus::Closed }
    })
    .await;
    assert!(closed, "stop-loss exit never completed");

    let position = &p.positions.all()[0];
    assert_relative_eq!(position.pnl_pct.unwrap(), -20.0, epsilon = 1e-6);

    // more ticks below the stop must not sell again
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(p.quotes.swap_calls().len(), 2);
    let sells = p.ledger.records().into_iter().filter(|r| r.side == TradeSide::Sell).count();
    assert_eq!(sells, 1);

    assert!(!p.feed.is_polling().await);
    assert!(p.engine.watched_positions().await.is_empty());
    let autos = p.engine.user_automations("u1").await.unwrap();
    assert_eq!(autos[0].total_executions, 1);
    assert!(p.store.all_activity().iter().any(|a| a.title == "Stop-Loss triggered: BONK"));

    p.engine.stop_monitoring().await;
}

#[tokio::test]
async fn test_new_buy_restarts_idle_feed() {
    let p = pipeline(Options::default());
    assert_eq!(p.engine.start_monitoring("u1", &p.wallet).await.unwrap(), 0);
    assert!(!p.feed.is_polling().await);

    p.prices.set_price(MINT, 4.0);
    p.orchestrator.process(&p.wallet, &TradeInstruction::buy_usd("BONK", 50.0)).await;

    let feed = p.feed.clone();
    let polling = eventually(|| {
        let feed = feed.clone();
        async move { feed.is_polling().await }
    })
    .await;
    assert!(polling, "new position was never watched");
    assert_eq!(p.engine.watched_positions().await.len(), 1);
    assert_eq!(p.feed.watched().await, vec![MINT.to_string()]);

    p.engine.stop_monitoring().await;
    assert!(!p.feed.is_polling().await);
}
