//! Automation Engine
//!
//! Watches a user's open positions against the price feed and fires the
//! stop-loss / take-profit exit through the orchestrator's SELL path. A
//! position leaves the watch map before its exit is spawned, so two ticks
//! landing together can never sell it twice.
//!
//! Monitoring is a single session per engine: starting again replaces the
//! previous listener instead of adding a second one. The listener also
//! reconciles the watch map with the position store on an interval, so
//! buys and sells made by another process are picked up.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::orchestrator::{TradeEvent, TradeOrchestrator};
use super::price_feed::{PriceFeed, PriceUpdate};
use crate::domain::playbook::{
    catalogue, find_playbook, playbook_for_exit, ActivityEntry, ActivityType, Automation, PlaybookDefinition,
};
use crate::domain::position::{ExitReason, Position};
use crate::ports::storage::{AutomationStore, AutomationStoreError, PositionStore, PositionStoreError};

pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

/// How often the watch map is re-read from the position store
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Unknown playbook: {0}")]
    UnknownPlaybook(String),

    #[error(transparent)]
    Store(#[from] AutomationStoreError),

    #[error(transparent)]
    Positions(#[from] PositionStoreError),
}

/// What happens to a position whose automated sell failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitFailurePolicy {
    /// Back to WATCHED; the next qualifying tick tries again
    #[default]
    Rewatch,
    /// Stop watching it for the rest of the session; the position stays OPEN
    Abandon,
}

struct Session {
    user_id: String,
    wallet: String,
    listener: JoinHandle<()>,
}

#[derive(Default)]
struct MonitorState {
    session: Option<Session>,
    /// WATCHED positions by id
    watched: HashMap<String, Position>,
    /// Claimed by a tick, sell in flight
    exiting: HashSet<String>,
    /// Failed exits under the Abandon policy
    abandoned: HashSet<String>,
}

impl MonitorState {
    fn wants(&self, position: &Position) -> bool {
        (position.stop_loss_pct.is_some() || position.take_profit_pct.is_some())
            && !self.exiting.contains(&position.id)
            && !self.abandoned.contains(&position.id)
    }
}

struct EngineInner {
    orchestrator: Arc<TradeOrchestrator>,
    feed: PriceFeed,
    positions: Arc<dyn PositionStore>,
    store: Arc<dyn AutomationStore>,
    policy: ExitFailurePolicy,
    state: Mutex<MonitorState>,
}

#[derive(Clone)]
pub struct AutomationEngine {
    inner: Arc<EngineInner>,
    reconcile_every: Duration,
}

impl AutomationEngine {
    pub fn new(
        orchestrator: Arc<TradeOrchestrator>,
        feed: PriceFeed,
        positions: Arc<dyn PositionStore>,
        store: Arc<dyn AutomationStore>,
        policy: ExitFailurePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                orchestrator,
                feed,
                positions,
                store,
                policy,
                state: Mutex::new(MonitorState::default()),
            }),
            reconcile_every: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    /// Applies to sessions started after the call
    pub fn with_reconcile_interval(mut self, every: Duration) -> Self {
        self.reconcile_every = every;
        self
    }

    /// Watch every open position of `wallet`; returns how many are watched
    pub async fn start_monitoring(&self, user_id: &str, wallet: &str) -> Result<usize, AutomationError> {
        let open = self.inner.positions.open_positions(Some(wallet)).await?;

        let mut state = self.inner.state.lock().await;
        if let Some(previous) = state.session.take() {
            tracing::info!("Replacing monitoring session for {}", previous.user_id);
            previous.listener.abort();
        }
        state.watched.clear();
        state.abandoned.clear();

        // subscribe before the first watch so the first tick is not missed
        let prices = self.inner.feed.subscribe();
        let trades = self.inner.orchestrator.subscribe();
        for position in open {
            if state.wants(&position) {
                self.inner.feed.watch(&position.token.mint).await;
                state.watched.insert(position.id.clone(), position);
            }
        }
        let count = state.watched.len();

        let listener = tokio::spawn(listen(Arc::downgrade(&self.inner), prices, trades, self.reconcile_every));
        state.session = Some(Session {
            user_id: user_id.to_string(),
            wallet: wallet.to_string(),
            listener,
        });
        tracing::info!("Monitoring {} position(s) for {}", count, wallet);
        Ok(count)
    }

    /// Clear the watch map and halt the price feed
    pub async fn stop_monitoring(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(session) = state.session.take() {
            session.listener.abort();
            tracing::info!("Stopped monitoring for {}", session.user_id);
        }
        state.watched.clear();
        state.abandoned.clear();
        self.inner.feed.stop().await;
    }

    pub async fn is_monitoring(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.session.as_ref().is_some_and(|s| !s.listener.is_finished())
    }

    /// Ids of the positions currently WATCHED
    pub async fn watched_positions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.state.lock().await.watched.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Sync the watch map with the store's OPEN positions for the session
    /// wallet; returns how many are watched afterwards
    pub async fn reconcile(&self) -> Result<usize, AutomationError> {
        self.inner.reconcile().await
    }

    /// Evaluate one price update directly, outside the listener task.
    /// Returns the handles of the exits it started.
    pub async fn handle_price(&self, update: &PriceUpdate) -> Vec<JoinHandle<()>> {
        self.inner.clone().on_price(update).await
    }

    pub fn playbooks(&self) -> Vec<PlaybookDefinition> {
        catalogue()
    }

    /// Enable a playbook for `user_id`, merging `params` over its defaults
    pub async fn activate(&self, user_id: &str, playbook_id: &str, params: &Value) -> Result<Automation, AutomationError> {
        let playbook = find_playbook(playbook_id).ok_or_else(|| AutomationError::UnknownPlaybook(playbook_id.to_string()))?;

        let automation = match self.inner.store.get(user_id, playbook_id).await? {
            Some(mut existing) => {
                existing.reactivate(&playbook, params);
                existing
            }
            None => Automation::activate(user_id, &playbook, params),
        };
        self.inner.store.upsert(&automation).await?;

        let entry = ActivityEntry::new(
            user_id,
            ActivityType::Automation,
            format!("Playbook activated: {}", playbook.name),
            playbook.description,
        )
        .with_metadata(json!({ "playbookId": playbook.id, "params": automation.trigger_params }));
        self.inner.store.log_activity(&entry).await?;
        tracing::info!("Activated {} for {}", playbook.id, user_id);
        Ok(automation)
    }

    /// Disable a playbook; false if the user never activated it
    pub async fn deactivate(&self, user_id: &str, playbook_id: &str) -> Result<bool, AutomationError> {
        let Some(mut automation) = self.inner.store.get(user_id, playbook_id).await? else {
            return Ok(false);
        };
        automation.enabled = false;
        self.inner.store.upsert(&automation).await?;

        let entry = ActivityEntry::new(
            user_id,
            ActivityType::Automation,
            format!("Playbook deactivated: {}", automation.name),
            "",
        )
        .with_metadata(json!({ "playbookId": playbook_id }));
        self.inner.store.log_activity(&entry).await?;
        Ok(true)
    }

    pub async fn user_automations(&self, user_id: &str) -> Result<Vec<Automation>, AutomationError> {
        Ok(self.inner.store.list(user_id).await?)
    }

    pub async fn activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEntry>, AutomationError> {
        Ok(self.inner.store.activity(user_id, limit).await?)
    }
}

async fn listen(
    engine: Weak<EngineInner>,
    mut prices: tokio::sync::broadcast::Receiver<PriceUpdate>,
    mut trades: tokio::sync::broadcast::Receiver<TradeEvent>,
    reconcile_every: Duration,
) {
    let mut reconcile = interval_at(Instant::now() + reconcile_every, reconcile_every);
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            update = prices.recv() => match update {
                Ok(update) => {
                    let Some(inner) = engine.upgrade() else { break };
                    inner.on_price(&update).await;
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("Automation lagged {} price update(s)", n),
                Err(RecvError::Closed) => break,
            },
            event = trades.recv() => match event {
                Ok(event) => {
                    let Some(inner) = engine.upgrade() else { break };
                    inner.on_trade(event).await;
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("Automation lagged {} trade event(s)", n),
                Err(RecvError::Closed) => break,
            },
            _ = reconcile.tick() => {
                let Some(inner) = engine.upgrade() else { break };
                if let Err(e) = inner.reconcile().await {
                    tracing::warn!("Watch reconcile failed: {}", e);
                }
            }
        }
    }
}

impl EngineInner {
    /// Claim every triggered position on the mint, then spawn its exit
    async fn on_price(self: Arc<Self>, update: &PriceUpdate) -> Vec<JoinHandle<()>> {
        let (user_id, claimed) = {
            let mut state = self.state.lock().await;
            let Some(user_id) = state.session.as_ref().map(|s| s.user_id.clone()) else {
                return Vec::new();
            };
            let triggered: Vec<(String, ExitReason)> = state
                .watched
                .values()
                .filter(|p| p.token.mint == update.mint)
                .filter_map(|p| p.exit_trigger(update.price).map(|r| (p.id.clone(), r)))
                .collect();
            let claimed: Vec<(Position, ExitReason)> = triggered
                .into_iter()
                .filter_map(|(id, reason)| state.watched.remove(&id).map(|p| (p, reason)))
                .collect();
            for (position, _) in &claimed {
                state.exiting.insert(position.id.clone());
            }
            (user_id, claimed)
        };

        claimed
            .into_iter()
            .map(|(position, reason)| {
                tracing::info!(
                    "{} hit on {} ({}) at ${}: {:.2}%",
                    reason.as_str(),
                    position.id,
                    position.token.symbol,
                    update.price,
                    position.pnl_pct_at(update.price)
                );
                let engine = self.clone();
                let user_id = user_id.clone();
                let price = update.price;
                tokio::spawn(async move { engine.exit(user_id, position, reason, price).await })
            })
            .collect()
    }

    async fn on_trade(&self, event: TradeEvent) {
        match event {
            TradeEvent::PositionOpened(position) => {
                let mut state = self.state.lock().await;
                let ours = state.session.as_ref().is_some_and(|s| s.wallet == position.wallet);
                if ours && state.wants(&position) {
                    tracing::info!("Watching new position {} ({})", position.id, position.token.symbol);
                    self.feed.watch(&position.token.mint).await;
                    state.watched.insert(position.id.clone(), position);
                }
            }
            TradeEvent::PositionClosed(position) => {
                let mut state = self.state.lock().await;
                if state.watched.remove(&position.id).is_some() {
                    tracing::debug!("Position {} closed elsewhere", position.id);
                }
                state.abandoned.remove(&position.id);
                self.release_mint(&state, &position.token.mint).await;
            }
        }
    }

    async fn reconcile(&self) -> Result<usize, AutomationError> {
        let Some(wallet) = self.state.lock().await.session.as_ref().map(|s| s.wallet.clone()) else {
            return Ok(0);
        };
        let open = self.positions.open_positions(Some(&wallet)).await?;
        let open_ids: HashSet<&str> = open.iter().map(|p| p.id.as_str()).collect();

        let mut state = self.state.lock().await;
        if state.session.as_ref().map(|s| s.wallet.as_str()) != Some(wallet.as_str()) {
            return Ok(state.watched.len());
        }

        let stale: Vec<String> = state
            .watched
            .keys()
            .filter(|id| !open_ids.contains(id.as_str()))
            .cloned()
            .collect();
        let mut released = Vec::new();
        for id in stale {
            if let Some(position) = state.watched.remove(&id) {
                tracing::info!("Position {} ({}) is no longer open, unwatching", id, position.token.symbol);
                released.push(position.token.mint);
            }
        }
        for mint in released {
            self.release_mint(&state, &mint).await;
        }

        for position in open {
            if !state.watched.contains_key(&position.id) && state.wants(&position) {
                tracing::info!("Watching position {} ({}) found in store", position.id, position.token.symbol);
                self.feed.watch(&position.token.mint).await;
                state.watched.insert(position.id.clone(), position);
            }
        }
        Ok(state.watched.len())
    }

    /// Persisted status of a claimed position; a store error counts as open
    async fn still_open(&self, id: &str) -> bool {
        match self.positions.get(id).await {
            Ok(Some(position)) => position.is_open(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Position lookup for {} failed: {}", id, e);
                true
            }
        }
    }

    /// EXITING: sell 100% and settle the outcome
    async fn exit(&self, user_id: String, position: Position, reason: ExitReason, trigger_price: f64) {
        if !self.still_open(&position.id).await {
            tracing::info!("Position {} closed before its {} exit, dropping it", position.id, reason.as_str());
            let mut state = self.state.lock().await;
            state.exiting.remove(&position.id);
            self.release_mint(&state, &position.token.mint).await;
            return;
        }

        let outcome = self.orchestrator.exit_position(&position, reason).await;
        let title_kind = match reason {
            ExitReason::StopLoss => "Stop-Loss",
            ExitReason::TakeProfit => "Take-Profit",
            ExitReason::Manual => "Manual exit",
        };

        if outcome.is_success() {
            let pnl = outcome.pnl_pct.unwrap_or_else(|| position.pnl_pct_at(trigger_price));
            let entry = ActivityEntry::new(
                &user_id,
                ActivityType::AutoSell,
                format!("{} triggered: {}", title_kind, position.token.symbol),
                format!("{} at {:.2}% PnL", reason.as_str(), pnl),
            )
            .with_metadata(json!({
                "tradeId": outcome.record_id,
                "positionId": position.id,
                "reason": reason.as_str(),
                "pnlPct": pnl,
                "txHash": outcome.tx_hash,
            }));
            self.log(&entry).await;

            {
                let mut state = self.state.lock().await;
                state.exiting.remove(&position.id);
                self.release_mint(&state, &position.token.mint).await;
            }
            // the sale emptied the wallet's holding, so sibling positions closed too
            if let Err(e) = self.reconcile().await {
                tracing::warn!("Watch reconcile after exit failed: {}", e);
            }

            if let Some(playbook) = playbook_for_exit(reason) {
                match self.store.record_execution(&user_id, playbook, Utc::now()).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("{} not activated for {}, counter untouched", playbook, user_id),
                    Err(e) => tracing::warn!("Failed to bump {} counter: {}", playbook, e),
                }
            }
            return;
        }

        let error = outcome.error.clone().unwrap_or_else(|| outcome.status.to_string());
        tracing::error!("Automated {} for {} failed: {}", reason.as_str(), position.id, error);
        let entry = ActivityEntry::new(
            &user_id,
            ActivityType::AutoSellFailed,
            format!("{} sell failed: {}", title_kind, position.token.symbol),
            error.clone(),
        )
        .with_metadata(json!({
            "positionId": position.id,
            "reason": reason.as_str(),
            "error": error,
            "txHash": outcome.tx_hash,
        }));
        self.log(&entry).await;

        let open = self.still_open(&position.id).await;
        let mut state = self.state.lock().await;
        state.exiting.remove(&position.id);
        match self.policy {
            _ if !open => {
                tracing::info!("Position {} closed elsewhere, not re-watching", position.id);
                self.release_mint(&state, &position.token.mint).await;
            }
            ExitFailurePolicy::Rewatch if state.session.is_some() => {
                tracing::info!("Re-watching {} after failed exit", position.id);
                state.watched.insert(position.id.clone(), position);
            }
            ExitFailurePolicy::Rewatch => self.release_mint(&state, &position.token.mint).await,
            ExitFailurePolicy::Abandon => {
                state.abandoned.insert(position.id.clone());
                self.release_mint(&state, &position.token.mint).await;
            }
        }
    }

    /// Unwatch `mint` when no WATCHED position still needs it
    async fn release_mint(&self, state: &MonitorState, mint: &str) {
        if !state.watched.values().any(|p| p.token.mint == mint) {
            self.feed.unwatch(mint).await;
        }
    }

    async fn log(&self, entry: &ActivityEntry) {
        if let Err(e) = self.store.log_activity(entry).await {
            tracing::warn!("Failed to log activity: {}", e);
        }
    }
}
