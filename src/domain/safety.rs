//! Token Safety Scoring
//!
//! Point-additive rug/scam scoring from on-chain security facts. Higher scores
//! are riskier; the score is clamped to 0-100 and mapped onto four tiers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Score assigned when security data is missing or the source failed
pub const UNKNOWN_SCORE: u8 = 25;

/// Top-10 holder concentration above which the token is penalised
pub const TOP10_CONCENTRATION_PCT: f64 = 50.0;

/// Creator-tagged holdings above which the token is penalised
pub const CREATOR_HOLDING_PCT: f64 = 10.0;

/// Tokens younger than this are penalised
pub const YOUNG_TOKEN_HOURS: i64 = 24;

const MINT_AUTHORITY_POINTS: u32 = 30;
const FREEZE_AUTHORITY_POINTS: u32 = 20;
const CONCENTRATION_POINTS: u32 = 20;
const CREATOR_POINTS: u32 = 15;
const UNLOCKED_LP_POINTS: u32 = 15;
const YOUNG_TOKEN_POINTS: u32 = 10;

/// Risk tier derived from the numeric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Warn,
    High,
    Block,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=20 => RiskLevel::Safe,
            21..=50 => RiskLevel::Warn,
            51..=80 => RiskLevel::High,
            _ => RiskLevel::Block,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Low Risk",
            RiskLevel::Warn => "Medium Risk",
            RiskLevel::High => "High Risk",
            RiskLevel::Block => "SCAM",
        }
    }
}

/// Raw security facts for one mint, as reported by a token security service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityFacts {
    pub closable: bool,
    pub non_transferable: bool,
    pub has_transfer_hook: bool,
    pub balance_mutable: bool,
    pub mint_authority_active: bool,
    pub freeze_authority_active: bool,
    /// Percent (0-100) of supply held by the ten largest holders
    pub top10_holder_pct: f64,
    /// Percent (0-100) of supply held by creator-tagged wallets
    pub creator_hold_pct: f64,
    pub total_liquidity_usd: f64,
    /// Some pool shows more than half of its LP burned or locked
    pub lp_locked: bool,
    pub holder_count: u64,
    pub name: String,
    pub symbol: String,
}

impl SecurityFacts {
    pub fn is_honeypot(&self) -> bool {
        self.closable || self.non_transferable || self.has_transfer_hook || self.balance_mutable
    }
}

/// One labelled line of the assessment checklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub label: String,
    pub ok: bool,
    pub detail: Option<String>,
}

impl SafetyCheck {
    fn pass(label: &str, detail: Option<String>) -> Self {
        Self { label: label.to_string(), ok: true, detail }
    }

    fn fail(label: &str, detail: impl Into<String>) -> Self {
        Self { label: label.to_string(), ok: false, detail: Some(detail.into()) }
    }
}

/// Point-in-time safety evaluation of one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub mint: String,
    pub score: u8,
    pub level: RiskLevel,
    pub label: String,
    pub risks: Vec<String>,
    pub checks: Vec<SafetyCheck>,
    pub holder_count: u64,
    pub top10_holder_pct: f64,
    pub creator_hold_pct: f64,
    pub total_liquidity_usd: f64,
    pub token_name: String,
    pub token_symbol: String,
    /// False when the assessment is the cautious fallback
    pub data_available: bool,
    pub assessed_at: DateTime<Utc>,
}

impl SafetyAssessment {
    /// Cautious fallback used whenever security data is missing
    pub fn unknown(mint: impl Into<String>) -> Self {
        let unverified = |label: &str| SafetyCheck::pass(label, Some("Unable to verify".to_string()));
        let no_data = |label: &str| SafetyCheck::pass(label, Some("No data".to_string()));

        Self {
            mint: mint.into(),
            score: UNKNOWN_SCORE,
            level: RiskLevel::Warn,
            label: "Unknown".to_string(),
            risks: vec!["Safety data unavailable - proceed with caution".to_string()],
            checks: vec![
                unverified("Not a Honeypot"),
                unverified("Mint Revoked"),
                unverified("Freeze Revoked"),
                no_data("Holder Distribution"),
                no_data("Creator Holdings"),
                no_data("LP Locked/Burned"),
            ],
            holder_count: 0,
            top10_holder_pct: 0.0,
            creator_hold_pct: 0.0,
            total_liquidity_usd: 0.0,
            token_name: String::new(),
            token_symbol: String::new(),
            data_available: false,
            assessed_at: Utc::now(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.level == RiskLevel::Block
    }
}

/// Score a token from its security facts.
///
/// `token_age` is the time since the token's first pool was created, when known.
pub fn score_token(mint: &str, facts: &SecurityFacts, token_age: Option<Duration>) -> SafetyAssessment {
    let mut score: u32 = 0;
    let mut risks = Vec::new();
    let mut checks = Vec::new();

    let honeypot = facts.is_honeypot();
    if honeypot {
        risks.push("Honeypot detected - cannot sell this token".to_string());
        checks.push(SafetyCheck::fail("Not a Honeypot", "Token can be frozen/drained/closed"));
    } else {
        checks.push(SafetyCheck::pass("Not a Honeypot", None));
    }

    if facts.mint_authority_active {
        score += MINT_AUTHORITY_POINTS;
        risks.push("Mint authority active - supply can be inflated".to_string());
        checks.push(SafetyCheck::fail("Mint Revoked", "Mint authority still active"));
    } else {
        checks.push(SafetyCheck::pass("Mint Revoked", None));
    }

    if facts.freeze_authority_active {
        score += FREEZE_AUTHORITY_POINTS;
        risks.push("Freeze authority active - tokens can be frozen".to_string());
        checks.push(SafetyCheck::fail("Freeze Revoked", "Freeze authority still active"));
    } else {
        checks.push(SafetyCheck::pass("Freeze Revoked", None));
    }

    let top10 = facts.top10_holder_pct;
    if top10 > TOP10_CONCENTRATION_PCT {
        score += CONCENTRATION_POINTS;
        risks.push(format!("Top 10 holders own {:.1}% of supply", top10));
        checks.push(SafetyCheck::fail("Holder Distribution", format!("Top 10 own {:.1}%", top10)));
    } else {
        checks.push(SafetyCheck::pass("Holder Distribution", Some(format!("Top 10 own {:.1}%", top10))));
    }

    let creator = facts.creator_hold_pct;
    if creator > CREATOR_HOLDING_PCT {
        score += CREATOR_POINTS;
        risks.push(format!("Creator holds {:.1}% of supply", creator));
        checks.push(SafetyCheck::fail("Creator Holdings", format!("{:.1}%", creator)));
    } else {
        let detail = if creator > 0.0 { format!("{:.1}%", creator) } else { "0%".to_string() };
        checks.push(SafetyCheck::pass("Creator Holdings", Some(detail)));
    }

    if !facts.lp_locked && facts.total_liquidity_usd > 0.0 {
        score += UNLOCKED_LP_POINTS;
        risks.push("No liquidity locked/burned".to_string());
        checks.push(SafetyCheck::fail("LP Locked/Burned", "LP not burned"));
    } else if facts.lp_locked {
        checks.push(SafetyCheck::pass("LP Locked/Burned", None));
    } else {
        checks.push(SafetyCheck::fail("LP Locked/Burned", "No DEX data"));
    }

    if let Some(age) = token_age {
        if age >= Duration::zero() && age < Duration::hours(YOUNG_TOKEN_HOURS) {
            score += YOUNG_TOKEN_POINTS;
            risks.push("Token is less than 24 hours old".to_string());
        }
    }

    // Honeypot overrides every other factor
    let score = if honeypot { 100 } else { score.min(100) as u8 };
    let level = RiskLevel::from_score(score);

    SafetyAssessment {
        mint: mint.to_string(),
        score,
        level,
        label: level.label().to_string(),
        risks,
        checks,
        holder_count: facts.holder_count,
        top10_holder_pct: (top10 * 10.0).round() / 10.0,
        creator_hold_pct: (creator * 10.0).round() / 10.0,
        total_liquidity_usd: facts.total_liquidity_usd.round(),
        token_name: facts.name.clone(),
        token_symbol: facts.symbol.clone(),
        data_available: true,
        assessed_at: Utc::now(),
    }
}
