//! GoPlus token_security response types
//!
//! GoPlus encodes flags as "0"/"1" strings and numbers as either strings or
//! numbers depending on the field, so everything is parsed leniently.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::domain::safety::SecurityFacts;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<HashMap<String, GoPlusToken>>,
}

impl SecurityResponse {
    /// Record for `mint`; GoPlus sometimes keys results by the lowercased address
    pub fn record(&self, mint: &str) -> Option<&GoPlusToken> {
        let result = self.result.as_ref()?;
        result.get(mint).or_else(|| result.get(&mint.to_lowercase()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authority {
    #[serde(default)]
    pub status: Option<String>,
}

impl Authority {
    fn active(&self) -> bool {
        self.status.as_deref() == Some("1")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Holder {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub percent: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Creator {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dex {
    #[serde(default)]
    pub tvl: Value,
    #[serde(default)]
    pub burn_percent: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoPlusToken {
    #[serde(default)]
    pub mintable: Authority,
    #[serde(default)]
    pub freezable: Authority,
    #[serde(default)]
    pub closable: Authority,
    #[serde(default)]
    pub balance_mutable_authority: Authority,
    #[serde(default)]
    pub non_transferable: Option<String>,
    #[serde(default)]
    pub transfer_hook: Vec<Value>,
    #[serde(default)]
    pub holders: Vec<Holder>,
    #[serde(default)]
    pub holder_count: Value,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub dex: Vec<Dex>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Number from a JSON string or number, 0 otherwise
fn num(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl GoPlusToken {
    pub fn to_facts(&self) -> SecurityFacts {
        // holder percents are fractions of supply (0.12 = 12%)
        let top10_holder_pct = self.holders.iter().take(10).map(|h| num(&h.percent)).sum::<f64>() * 100.0;

        let creators: HashSet<&str> = self.creators.iter().map(|c| c.address.as_str()).collect();
        let creator_hold_pct = self
            .holders
            .iter()
            .filter(|h| creators.contains(h.address.as_str()))
            .map(|h| num(&h.percent))
            .sum::<f64>()
            * 100.0;

        let total_liquidity_usd = self.dex.iter().map(|d| num(&d.tvl)).sum();
        let lp_locked = self.dex.iter().any(|d| num(&d.burn_percent) > 50.0);
        let metadata = self.metadata.clone().unwrap_or_default();

        SecurityFacts {
            closable: self.closable.active(),
            non_transferable: self.non_transferable.as_deref() == Some("1"),
            has_transfer_hook: !self.transfer_hook.is_empty(),
            balance_mutable: self.balance_mutable_authority.active(),
            mint_authority_active: self.mintable.active(),
            freeze_authority_active: self.freezable.active(),
            top10_holder_pct,
            creator_hold_pct,
            total_liquidity_usd,
            lp_locked,
            holder_count: num(&self.holder_count) as u64,
            name: metadata.name,
            symbol: metadata.symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_record() {
        let resp: SecurityResponse = serde_json::from_value(json!({
            "code": 1,
            "message": "OK",
            "result": {
                "mint111": {
                    "mintable": { "status": "1", "authority": [] },
                    "freezable": { "status": "0", "authority": [] },
                    "closable": { "status": "0" },
                    "balance_mutable_authority": { "status": "0" },
                    "non_transferable": "0",
                    "transfer_hook": [],
                    "holders": [
                        { "address": "A", "percent": "0.30" },
                        { "address": "B", "percent": "0.25" },
                        { "address": "C", "percent": 0.05 }
                    ],
                    "holder_count": "1234",
                    "creators": [{ "address": "B" }],
                    "dex": [
                        { "tvl": "15000.5", "burn_percent": 99.0 },
                        { "tvl": 500 }
                    ],
                    "metadata": { "name": "Token X", "symbol": "X" }
                }
            }
        }))
        .unwrap();

        let facts = resp.record("mint111").unwrap().to_facts();
        assert!(facts.mint_authority_active);
        assert!(!facts.freeze_authority_active);
        assert!(!facts.is_honeypot());
        assert!((facts.top10_holder_pct - 60.0).abs() < 1e-9);
        assert!((facts.creator_hold_pct - 25.0).abs() < 1e-9);
        assert!((facts.total_liquidity_usd - 15500.5).abs() < 1e-9);
        assert!(facts.lp_locked);
        assert_eq!(facts.holder_count, 1234);
        assert_eq!(facts.symbol, "X");
    }

    #[test]
    fn test_transfer_hook_is_honeypot() {
        let token: GoPlusToken = serde_json::from_value(json!({
            "transfer_hook": [{ "address": "Hook111" }]
        }))
        .unwrap();
        assert!(token.to_facts().is_honeypot());
    }

    #[test]
    fn test_lowercase_key_fallback() {
        let resp: SecurityResponse = serde_json::from_value(json!({
            "result": { "abcdef": {} }
        }))
        .unwrap();
        assert!(resp.record("AbCdEf").is_some());
        assert!(resp.record("other").is_none());

        let empty: SecurityResponse = serde_json::from_value(json!({ "code": 1 })).unwrap();
        assert!(empty.record("AbCdEf").is_none());
    }
}
