//! Token Identity
//!
//! Resolved tradeable assets and the address heuristics the resolver relies on.

use serde::{Deserialize, Serialize};

/// Wrapped SOL mint, used as the native side of every swap
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Native asset decimals (lamports per SOL = 10^9)
pub const SOL_DECIMALS: u8 = 9;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Decimals assumed for a mint that no registry knows about
pub const DEFAULT_UNKNOWN_DECIMALS: u8 = 9;

/// A resolved tradeable asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl TokenIdentity {
    pub fn new(
        mint: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            mint: mint.into(),
            symbol: symbol.into(),
            name: name.into(),
            decimals,
        }
    }

    /// Placeholder identity for a literal mint no registry could confirm
    pub fn unknown(mint: impl Into<String>) -> Self {
        Self::new(mint, "UNKNOWN", "Unknown Token", DEFAULT_UNKNOWN_DECIMALS)
    }

    pub fn sol() -> Self {
        Self::new(SOL_MINT, "SOL", "Wrapped SOL", SOL_DECIMALS)
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == "UNKNOWN"
    }

    /// Convert a UI amount (e.g. 12.5 tokens) into base units
    pub fn to_base_units(&self, ui_amount: f64) -> u64 {
        to_base_units(ui_amount, self.decimals)
    }

    /// Convert base units into a UI amount
    pub fn to_ui_amount(&self, base_units: u64) -> f64 {
        to_ui_amount(base_units, self.decimals)
    }
}

/// A registry entry competing for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Liquidity proxy used for ranking (USD liquidity or daily volume)
    #[serde(default)]
    pub liquidity: f64,
    #[serde(default)]
    pub verified: bool,
}

impl TokenCandidate {
    pub fn identity(&self) -> TokenIdentity {
        TokenIdentity::new(&self.address, &self.symbol, &self.name, self.decimals)
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub token: TokenIdentity,
    /// More than one candidate shared the query's ticker
    pub duplicates: bool,
    /// Top alternatives that lost the liquidity ranking (at most five)
    pub alternatives: Vec<TokenCandidate>,
    /// Whether the chosen mint answered a trial quote; `None` when not checked
    pub routable: Option<bool>,
}

/// Does this string look like a base58 Solana public key?
pub fn is_address_like(query: &str) -> bool {
    let len = query.len();
    if !(32..=44).contains(&len) {
        return false;
    }
    matches!(bs58::decode(query).into_vec(), Ok(bytes) if bytes.len() == 32)
}

pub fn to_base_units(ui_amount: f64, decimals: u8) -> u64 {
    if ui_amount <= 0.0 || !ui_amount.is_finite() {
        return 0;
    }
    (ui_amount * 10f64.powi(decimals as i32)).floor() as u64
}

pub fn to_ui_amount(base_units: u64, decimals: u8) -> f64 {
    base_units as f64 / 10f64.powi(decimals as i32)
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    to_ui_amount(lamports, SOL_DECIMALS)
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    to_base_units(sol, SOL_DECIMALS)
}
