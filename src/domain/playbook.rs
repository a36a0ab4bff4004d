//! Playbooks and Activity
//!
//! A playbook is a named automation rule: a trigger condition plus the action
//! it fires. Users activate playbooks with optional parameter overrides; the
//! automation engine bumps counters when a price-driven playbook fires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::position::{new_id, ExitReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    PriceDrop,
    PriceRise,
    LiquidityDrop,
    VolumeSurge,
    WhaleBuy,
    NewToken,
    SmartMoney,
    Graduation,
    WhaleSell,
}

impl TriggerType {
    /// Triggers the automation engine evaluates from price ticks
    pub fn is_price_driven(&self) -> bool {
        matches!(self, TriggerType::PriceDrop | TriggerType::PriceRise)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybookDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub trigger_type: TriggerType,
    pub default_params: Value,
    pub action_type: ActionType,
    pub action_params: Value,
}

pub const STOP_LOSS_GUARD: &str = "stop_loss_guard";
pub const TAKE_PROFIT: &str = "take_profit";

/// Playbook whose counter an automated exit increments
pub fn playbook_for_exit(reason: ExitReason) -> Option<&'static str> {
    match reason {
        ExitReason::StopLoss => Some(STOP_LOSS_GUARD),
        ExitReason::TakeProfit => Some(TAKE_PROFIT),
        ExitReason::Manual => None,
    }
}

/// The full playbook catalogue
pub fn catalogue() -> Vec<PlaybookDefinition> {
    use ActionType::*;
    use TriggerType::*;

    let def = |id, name, description, trigger_type, default_params, action_type, action_params| PlaybookDefinition {
        id,
        name,
        description,
        trigger_type,
        default_params,
        action_type,
        action_params,
    };

    vec![
        def(
            STOP_LOSS_GUARD,
            "Stop-Loss Guard",
            "Auto-sell when price drops below threshold from entry",
            PriceDrop,
            json!({ "threshold_pct": 20 }),
            Sell,
            json!({ "sell_pct": 100 }),
        ),
        def(
            TAKE_PROFIT,
            "Take-Profit",
            "Auto-sell when price rises above threshold from entry",
            PriceRise,
            json!({ "threshold_pct": 100 }),
            Sell,
            json!({ "sell_pct": 50 }),
        ),
        def(
            "rug_pull_exit",
            "Rug Pull Exit",
            "Emergency sell when liquidity drops sharply",
            LiquidityDrop,
            json!({ "threshold_pct": 50, "timeframe_min": 5 }),
            Sell,
            json!({ "sell_pct": 100 }),
        ),
        def(
            "alpha_buy",
            "Alpha Buy",
            "Auto-buy when 5min volume surges vs 1h average",
            VolumeSurge,
            json!({ "threshold_pct": 30 }),
            Buy,
            json!({ "portfolio_pct": 2 }),
        ),
        def(
            "momentum_sell",
            "Momentum Sell",
            "Sell 50% when price surges 100%+ from entry",
            PriceRise,
            json!({ "threshold_pct": 100 }),
            Sell,
            json!({ "sell_pct": 50 }),
        ),
        def(
            "whale_follow",
            "Whale Follow",
            "Auto-buy when top-100 wallet buys a token",
            WhaleBuy,
            json!({ "min_amount_usd": 10000 }),
            Buy,
            json!({ "portfolio_pct": 1 }),
        ),
        def(
            "new_token_snipe",
            "New Token Snipe",
            "Auto-buy newly deployed tokens with LP added",
            NewToken,
            json!({ "max_age_seconds": 60 }),
            Buy,
            json!({ "portfolio_pct": 0.5 }),
        ),
        def(
            "smart_money_alert",
            "Smart Money Alert",
            "Follow top-100 profitable traders",
            SmartMoney,
            json!({ "min_profit_pct": 50 }),
            Buy,
            json!({ "portfolio_pct": 1 }),
        ),
        def(
            "pumpfun_graduation",
            "Pump.fun Graduation Snipe",
            "Auto-buy tokens that graduate from pump.fun to Raydium",
            Graduation,
            json!({ "max_delay_seconds": 30 }),
            Buy,
            json!({ "portfolio_pct": 1 }),
        ),
        def(
            "concentrated_sell_protection",
            "Concentrated Sell Protection",
            "Exit when whale starts dumping large holdings",
            WhaleSell,
            json!({ "holder_threshold_pct": 10 }),
            Sell,
            json!({ "sell_pct": 100 }),
        ),
    ]
}

pub fn find_playbook(id: &str) -> Option<PlaybookDefinition> {
    catalogue().into_iter().find(|p| p.id == id)
}

/// A user's activation of one playbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub user_id: String,
    pub playbook_id: String,
    pub name: String,
    pub trigger_type: TriggerType,
    pub trigger_params: Value,
    pub action_type: ActionType,
    pub action_params: Value,
    pub enabled: bool,
    pub total_executions: u64,
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Automation {
    /// Fresh activation with `custom` merged over the playbook defaults
    pub fn activate(user_id: impl Into<String>, playbook: &PlaybookDefinition, custom: &Value) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            playbook_id: playbook.id.to_string(),
            name: playbook.name.to_string(),
            trigger_type: playbook.trigger_type,
            trigger_params: merge_params(&playbook.default_params, custom),
            action_type: playbook.action_type,
            action_params: playbook.action_params.clone(),
            enabled: true,
            total_executions: 0,
            last_triggered: None,
            created_at: Utc::now(),
        }
    }

    /// Re-enable an existing activation with new overrides
    pub fn reactivate(&mut self, playbook: &PlaybookDefinition, custom: &Value) {
        self.enabled = true;
        self.trigger_params = merge_params(&playbook.default_params, custom);
        self.action_params = playbook.action_params.clone();
    }

    pub fn record_execution(&mut self, at: DateTime<Utc>) {
        self.total_executions += 1;
        self.last_triggered = Some(at);
    }
}

/// Shallow merge of object `custom` over object `defaults`
pub fn merge_params(defaults: &Value, custom: &Value) -> Value {
    let mut merged: Map<String, Value> = defaults.as_object().cloned().unwrap_or_default();
    if let Some(overrides) = custom.as_object() {
        for (k, v) in overrides {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Trade,
    Blocked,
    AutoSell,
    AutoSellFailed,
    Automation,
    Transfer,
}

/// One entry in a user's activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        user_id: impl Into<String>,
        kind: ActivityType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            kind,
            title: title.into(),
            description: description.into(),
            metadata: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
