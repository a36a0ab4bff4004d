//! In-memory fakes for every port
//!
//! Each fake records its calls and answers from builder-configured canned
//! responses, so the real application services can be driven end to end
//! without a network.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::domain::playbook::{ActivityEntry, Automation};
use crate::domain::position::{Position, PositionError, PositionExit};
use crate::domain::safety::SecurityFacts;
use crate::domain::token::TokenCandidate;
use crate::domain::trade::TradeRecord;

use super::chain::{ChainError, ChainRpc, ConfirmOutcome, SendOptions, TokenHolding};
use super::market_data::{
    MarketDataError, PriceError, PriceSource, RateSource, RegistryError, RegistryTier, SecurityError,
    SecurityService, TokenRegistry,
};
use super::routing::{QuoteError, QuoteParams, QuoteService, RouteQuote, SwapTransaction};
use super::storage::{
    AutomationStore, AutomationStoreError, HistoryQuery, KeyStore, KeyStoreError, LedgerError, PositionStore,
    PositionStoreError, TradeLedger, WalletInfo,
};

/// Base64 unsigned transaction with `payer` as the only required signer
pub fn unsigned_transaction(payer: &Pubkey) -> String {
    let message = Message::new(&[], Some(payer));
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
        message: VersionedMessage::Legacy(message),
    };
    let bytes = bincode::serialize(&tx).unwrap_or_default();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Routing service fake. Quotes 1:1 unless an output amount is configured for
/// the output mint; scripted results are consumed first.
#[derive(Debug, Default, Clone)]
pub struct FakeQuoteService {
    scripted: Arc<Mutex<VecDeque<Result<RouteQuote, QuoteError>>>>,
    out_amounts: Arc<Mutex<HashMap<String, u64>>>,
    unroutable: Arc<Mutex<HashSet<String>>>,
    build_failures: Arc<Mutex<VecDeque<QuoteError>>>,
    quote_calls: Arc<Mutex<Vec<QuoteParams>>>,
    swap_calls: Arc<Mutex<Vec<String>>>,
}

impl FakeQuoteService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to fix the quoted output for a given output mint
    pub fn with_out_amount(self, output_mint: &str, out_amount: u64) -> Self {
        self.set_out_amount(output_mint, out_amount);
        self
    }

    pub fn with_unroutable(self, mint: &str) -> Self {
        self.unroutable.lock().unwrap().insert(mint.to_string());
        self
    }

    /// Queue a result returned by the next quote call
    pub fn with_quote_result(self, result: Result<RouteQuote, QuoteError>) -> Self {
        self.scripted.lock().unwrap().push_back(result);
        self
    }

    pub fn with_build_failure(self, error: QuoteError) -> Self {
        self.build_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn set_out_amount(&self, output_mint: &str, out_amount: u64) {
        self.out_amounts.lock().unwrap().insert(output_mint.to_string(), out_amount);
    }

    pub fn quote_calls(&self) -> Vec<QuoteParams> {
        self.quote_calls.lock().unwrap().clone()
    }

    pub fn swap_calls(&self) -> Vec<String> {
        self.swap_calls.lock().unwrap().clone()
    }

    pub fn quote(params: &QuoteParams, out_amount: u64) -> RouteQuote {
        RouteQuote {
            input_mint: params.input_mint.clone(),
            output_mint: params.output_mint.clone(),
            in_amount: params.amount,
            out_amount,
            slippage_bps: params.slippage_bps,
            price_impact_pct: 0.0,
            raw: serde_json::json!({
                "inputMint": params.input_mint,
                "outputMint": params.output_mint,
                "inAmount": params.amount.to_string(),
                "outAmount": out_amount.to_string(),
            }),
        }
    }
}

#[async_trait]
impl QuoteService for FakeQuoteService {
    async fn get_quote(&self, params: &QuoteParams) -> Result<RouteQuote, QuoteError> {
        self.quote_calls.lock().unwrap().push(params.clone());

        if let Some(result) = self.scripted.lock().unwrap().pop_front() {
            return result;
        }
        {
            let unroutable = self.unroutable.lock().unwrap();
            if unroutable.contains(&params.input_mint) || unroutable.contains(&params.output_mint) {
                return Err(QuoteError::NoRoute(params.output_mint.clone()));
            }
        }
        let out = self
            .out_amounts
            .lock()
            .unwrap()
            .get(&params.output_mint)
            .copied()
            .unwrap_or(params.amount);
        Ok(Self::quote(params, out))
    }

    async fn build_swap_transaction(
        &self,
        user_public_key: &str,
        _quote: &RouteQuote,
    ) -> Result<SwapTransaction, QuoteError> {
        self.swap_calls.lock().unwrap().push(user_public_key.to_string());

        if let Some(err) = self.build_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let payer = Pubkey::from_str(user_public_key).map_err(|e| QuoteError::Api(e.to_string()))?;
        Ok(SwapTransaction {
            swap_transaction: unsigned_transaction(&payer),
            last_valid_block_height: Some(1_000),
        })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Chain fake. Sends succeed with the transaction's own signature once any
/// configured transient failures are used up.
#[derive(Debug, Clone)]
pub struct FakeChain {
    balances: Arc<Mutex<HashMap<String, u64>>>,
    token_balances: Arc<Mutex<HashMap<(String, String), TokenHolding>>>,
    existing_accounts: Arc<Mutex<HashSet<String>>>,
    send_failures: Arc<Mutex<u32>>,
    confirm: Arc<Mutex<ConfirmOutcome>>,
    confirm_hangs: Arc<Mutex<bool>>,
    sent: Arc<Mutex<Vec<VersionedTransaction>>>,
    send_calls: Arc<Mutex<u32>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            balances: Arc::default(),
            token_balances: Arc::default(),
            existing_accounts: Arc::default(),
            send_failures: Arc::default(),
            confirm: Arc::new(Mutex::new(ConfirmOutcome::Confirmed)),
            confirm_hangs: Arc::default(),
            sent: Arc::default(),
            send_calls: Arc::default(),
        }
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, address: &str, lamports: u64) -> Self {
        self.set_balance(address, lamports);
        self
    }

    pub fn with_token_balance(self, owner: &str, mint: &str, amount: u64, decimals: u8) -> Self {
        self.set_token_balance(owner, mint, amount, decimals);
        self
    }

    pub fn with_account(self, address: &str) -> Self {
        self.existing_accounts.lock().unwrap().insert(address.to_string());
        self
    }

    /// Fail the next `n` sends with a transient error
    pub fn with_send_failures(self, n: u32) -> Self {
        *self.send_failures.lock().unwrap() = n;
        self
    }

    pub fn with_confirm_outcome(self, outcome: ConfirmOutcome) -> Self {
        *self.confirm.lock().unwrap() = outcome;
        self
    }

    /// Confirmation never resolves
    pub fn with_confirm_hang(self) -> Self {
        *self.confirm_hangs.lock().unwrap() = true;
        self
    }

    pub fn set_balance(&self, address: &str, lamports: u64) {
        self.balances.lock().unwrap().insert(address.to_string(), lamports);
    }

    pub fn set_token_balance(&self, owner: &str, mint: &str, amount: u64, decimals: u8) {
        self.token_balances
            .lock()
            .unwrap()
            .insert((owner.to_string(), mint.to_string()), TokenHolding { amount, decimals });
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_calls(&self) -> u32 {
        *self.send_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn get_balance(&self, address: &str) -> Result<u64, ChainError> {
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn get_latest_blockhash(&self) -> Result<(Hash, u64), ChainError> {
        Ok((Hash::default(), 1_000))
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        _options: SendOptions,
    ) -> Result<String, ChainError> {
        *self.send_calls.lock().unwrap() += 1;
        {
            let mut failures = self.send_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ChainError::Send("connection reset".to_string()));
            }
        }
        if !tx.verify_with_results().iter().all(|ok| *ok) {
            return Err(ChainError::Send("signature verification failed".to_string()));
        }
        let signature = tx
            .signatures
            .first()
            .map(|s| s.to_string())
            .ok_or_else(|| ChainError::Malformed("unsigned transaction".to_string()))?;
        self.sent.lock().unwrap().push(tx.clone());
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        _signature: &str,
        _last_valid_block_height: u64,
    ) -> Result<ConfirmOutcome, ChainError> {
        let hangs = *self.confirm_hangs.lock().unwrap();
        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(self.confirm.lock().unwrap().clone())
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<Option<TokenHolding>, ChainError> {
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&(owner.to_string(), mint.to_string()))
            .copied())
    }

    async fn account_exists(&self, address: &str) -> Result<bool, ChainError> {
        Ok(self.existing_accounts.lock().unwrap().contains(address))
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Registry fake with a strict tier and a broad tier
#[derive(Debug, Default, Clone)]
pub struct FakeRegistry {
    strict: Arc<Mutex<Vec<TokenCandidate>>>,
    all: Arc<Mutex<Vec<TokenCandidate>>>,
    failing: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<(RegistryTier, String)>>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verified token; listed in both tiers
    pub fn with_strict(self, candidate: TokenCandidate) -> Self {
        self.strict.lock().unwrap().push(candidate.clone());
        self.all.lock().unwrap().push(candidate);
        self
    }

    /// Unverified token; broad tier only
    pub fn with_unverified(self, candidate: TokenCandidate) -> Self {
        self.all.lock().unwrap().push(candidate);
        self
    }

    pub fn failing(self) -> Self {
        *self.failing.lock().unwrap() = true;
        self
    }

    pub fn get_calls(&self) -> Vec<(RegistryTier, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenRegistry for FakeRegistry {
    async fn search(&self, tier: RegistryTier, query: &str) -> Result<Vec<TokenCandidate>, RegistryError> {
        self.calls.lock().unwrap().push((tier, query.to_string()));
        if *self.failing.lock().unwrap() {
            return Err(MarketDataError::Network("registry unreachable".to_string()));
        }
        let q = query.to_lowercase();
        let source = match tier {
            RegistryTier::Strict => self.strict.lock().unwrap().clone(),
            RegistryTier::All => self.all.lock().unwrap().clone(),
        };
        Ok(source
            .into_iter()
            .filter(|c| c.symbol.to_lowercase().contains(&q) || c.name.to_lowercase().contains(&q))
            .collect())
    }

    async fn lookup_mint(&self, mint: &str) -> Result<Option<TokenCandidate>, RegistryError> {
        if *self.failing.lock().unwrap() {
            return Err(MarketDataError::Network("registry unreachable".to_string()));
        }
        Ok(self.all.lock().unwrap().iter().find(|c| c.address == mint).cloned())
    }
}

/// Security service fake
#[derive(Debug, Default, Clone)]
pub struct FakeSecurityService {
    facts: Arc<Mutex<HashMap<String, SecurityFacts>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSecurityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facts(self, mint: &str, facts: SecurityFacts) -> Self {
        self.facts.lock().unwrap().insert(mint.to_string(), facts);
        self
    }

    pub fn with_failure(self, mint: &str) -> Self {
        self.failing.lock().unwrap().insert(mint.to_string());
        self
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityService for FakeSecurityService {
    async fn get_security(&self, mint: &str) -> Result<Option<SecurityFacts>, SecurityError> {
        self.calls.lock().unwrap().push(mint.to_string());
        if self.failing.lock().unwrap().contains(mint) {
            return Err(MarketDataError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.facts.lock().unwrap().get(mint).cloned())
    }
}

/// Price source fake; prices can be changed while a feed polls it
#[derive(Debug, Default, Clone)]
pub struct FakePriceSource {
    prices: Arc<Mutex<HashMap<String, f64>>>,
    failing: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakePriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, mint: &str, price: f64) -> Self {
        self.set_price(mint, price);
        self
    }

    pub fn set_price(&self, mint: &str, price: f64) {
        self.prices.lock().unwrap().insert(mint.to_string(), price);
    }

    pub fn remove_price(&self, mint: &str) {
        self.prices.lock().unwrap().remove(mint);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn get_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn get_prices(&self, mints: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        self.calls.lock().unwrap().push(mints.to_vec());
        if *self.failing.lock().unwrap() {
            return Err(MarketDataError::Network("price source unreachable".to_string()));
        }
        let prices = self.prices.lock().unwrap();
        Ok(mints
            .iter()
            .filter_map(|m| prices.get(m).map(|p| (m.clone(), *p)))
            .collect())
    }
}

/// Conversion rate fake; `None` makes every call fail
#[derive(Debug, Clone)]
pub struct FixedRate(pub Option<f64>);

#[async_trait]
impl RateSource for FixedRate {
    async fn sol_usd(&self) -> Result<f64, PriceError> {
        self.0
            .ok_or_else(|| MarketDataError::Network("rate source unreachable".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    wallets: Arc<Mutex<HashMap<String, (WalletInfo, Vec<u8>)>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing keypair for a user
    pub fn with_keypair(self, user_id: &str, keypair: &Keypair) -> Self {
        let info = WalletInfo {
            user_id: user_id.to_string(),
            public_key: keypair.pubkey().to_string(),
            created_at: Utc::now(),
            already_exists: false,
        };
        self.wallets
            .lock()
            .unwrap()
            .insert(user_id.to_string(), (info, keypair.to_bytes().to_vec()));
        self
    }

    /// Store `keypair` under the public key of a different wallet
    pub fn with_mismatched_keypair(self, user_id: &str, address: &str, keypair: &Keypair) -> Self {
        let info = WalletInfo {
            user_id: user_id.to_string(),
            public_key: address.to_string(),
            created_at: Utc::now(),
            already_exists: false,
        };
        self.wallets
            .lock()
            .unwrap()
            .insert(user_id.to_string(), (info, keypair.to_bytes().to_vec()));
        self
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn create(&self, user_id: &str) -> Result<WalletInfo, KeyStoreError> {
        let mut wallets = self.wallets.lock().unwrap();
        if let Some((info, _)) = wallets.get(user_id) {
            return Ok(WalletInfo {
                already_exists: true,
                ..info.clone()
            });
        }
        let keypair = Keypair::new();
        let info = WalletInfo {
            user_id: user_id.to_string(),
            public_key: keypair.pubkey().to_string(),
            created_at: Utc::now(),
            already_exists: false,
        };
        wallets.insert(user_id.to_string(), (info.clone(), keypair.to_bytes().to_vec()));
        Ok(info)
    }

    async fn wallet_for_user(&self, user_id: &str) -> Result<Option<WalletInfo>, KeyStoreError> {
        Ok(self.wallets.lock().unwrap().get(user_id).map(|(info, _)| info.clone()))
    }

    async fn keypair(&self, address: &str) -> Result<Option<Keypair>, KeyStoreError> {
        let wallets = self.wallets.lock().unwrap();
        let Some((_, bytes)) = wallets.values().find(|(info, _)| info.public_key == address) else {
            return Ok(None);
        };
        Keypair::try_from(&bytes[..])
            .map(Some)
            .map_err(|e| KeyStoreError::Decryption(e.to_string()))
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    records: Arc<Mutex<Vec<TradeRecord>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TradeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeLedger for InMemoryLedger {
    async fn append(&self, record: &TradeRecord) -> Result<(), LedgerError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<TradeRecord>, LedgerError> {
        let mut out: Vec<TradeRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryPositionStore {
    positions: Arc<Mutex<Vec<Position>>>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(self, position: Position) -> Self {
        self.positions.lock().unwrap().push(position);
        self
    }

    pub fn all(&self) -> Vec<Position> {
        self.positions.lock().unwrap().clone()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn insert(&self, position: &Position) -> Result<(), PositionStoreError> {
        self.positions.lock().unwrap().push(position.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Position>, PositionStoreError> {
        Ok(self.positions.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn open_positions(&self, wallet: Option<&str>) -> Result<Vec<Position>, PositionStoreError> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_open() && wallet.map_or(true, |w| p.wallet == w))
            .cloned()
            .collect())
    }

    async fn latest_open(&self, wallet: &str, mint: &str) -> Result<Option<Position>, PositionStoreError> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_open() && p.wallet == wallet && p.token.mint == mint)
            .max_by_key(|p| p.opened_at)
            .cloned())
    }

    async fn close(&self, id: &str, exit: PositionExit) -> Result<Position, PositionStoreError> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PositionStoreError::NotFound(id.to_string()))?;
        position.close(exit).map_err(|e| match e {
            PositionError::AlreadyClosed => PositionStoreError::AlreadyClosed(id.to_string()),
            other => PositionStoreError::Serialization(other.to_string()),
        })?;
        Ok(position.clone())
    }

    async fn for_wallet(&self, wallet: &str) -> Result<Vec<Position>, PositionStoreError> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.wallet == wallet)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAutomationStore {
    automations: Arc<Mutex<Vec<Automation>>>,
    activity: Arc<Mutex<Vec<ActivityEntry>>>,
}

impl InMemoryAutomationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_activity(&self) -> Vec<ActivityEntry> {
        self.activity.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationStore for InMemoryAutomationStore {
    async fn get(&self, user_id: &str, playbook_id: &str) -> Result<Option<Automation>, AutomationStoreError> {
        Ok(self
            .automations
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.user_id == user_id && a.playbook_id == playbook_id)
            .cloned())
    }

    async fn upsert(&self, automation: &Automation) -> Result<(), AutomationStoreError> {
        let mut all = self.automations.lock().unwrap();
        match all
            .iter_mut()
            .find(|a| a.user_id == automation.user_id && a.playbook_id == automation.playbook_id)
        {
            Some(existing) => *existing = automation.clone(),
            None => all.push(automation.clone()),
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Automation>, AutomationStoreError> {
        Ok(self
            .automations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record_execution(
        &self,
        user_id: &str,
        playbook_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AutomationStoreError> {
        let mut all = self.automations.lock().unwrap();
        match all
            .iter_mut()
            .find(|a| a.user_id == user_id && a.playbook_id == playbook_id)
        {
            Some(a) => {
                a.record_execution(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn log_activity(&self, entry: &ActivityEntry) -> Result<(), AutomationStoreError> {
        self.activity.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEntry>, AutomationStoreError> {
        Ok(self
            .activity
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::TokenIdentity;

    #[tokio::test]
    async fn test_fake_quote_defaults_and_scripts() {
        let fake = FakeQuoteService::new()
            .with_out_amount("OUT", 42)
            .with_unroutable("DEAD")
            .with_quote_result(Err(QuoteError::RateLimited));

        let params = QuoteParams {
            input_mint: "IN".into(),
            output_mint: "OUT".into(),
            amount: 10,
            slippage_bps: 300,
        };
        assert_eq!(fake.get_quote(&params).await, Err(QuoteError::RateLimited));
        assert_eq!(fake.get_quote(&params).await.unwrap().out_amount, 42);

        let dead = QuoteParams {
            output_mint: "DEAD".into(),
            ..params
        };
        assert!(matches!(fake.get_quote(&dead).await, Err(QuoteError::NoRoute(_))));
        assert_eq!(fake.quote_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_fake_chain_send_requires_signature() {
        let kp = Keypair::new();
        let chain = FakeChain::new();
        let encoded = unsigned_transaction(&kp.pubkey());
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        let unsigned: VersionedTransaction = bincode::deserialize(&bytes).unwrap();

        assert!(chain.send_transaction(&unsigned, SendOptions::default()).await.is_err());

        let signed = VersionedTransaction::try_new(unsigned.message, &[&kp]).unwrap();
        let sig = chain.send_transaction(&signed, SendOptions::default()).await.unwrap();
        assert_eq!(sig, signed.signatures[0].to_string());
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_position_close_once() {
        let store = InMemoryPositionStore::new();
        let p = Position::open("W", TokenIdentity::new("M", "M", "M", 6), 1.0, 1.0, 0.1, 1.0).unwrap();
        store.insert(&p).await.unwrap();
        let exit = PositionExit {
            exit_price: 1.0,
            tx_hash: None,
            reason: crate::domain::position::ExitReason::Manual,
            closed_at: Utc::now(),
        };
        store.close(&p.id, exit.clone()).await.unwrap();
        assert!(matches!(
            store.close(&p.id, exit).await,
            Err(PositionStoreError::AlreadyClosed(_))
        ));
    }
}
