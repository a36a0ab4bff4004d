//! Jupiter Token Registry
//!
//! Token search over Jupiter's Token API V2. The strict tier keeps verified
//! tokens only; the broad tier returns every match.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::token::TokenCandidate;
use crate::ports::market_data::{MarketDataError, RegistryError, RegistryTier, TokenRegistry};

#[derive(Debug, Clone)]
pub struct JupiterTokenConfig {
    pub token_api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for JupiterTokenConfig {
    fn default() -> Self {
        Self {
            token_api_url: "https://api.jup.ag/tokens/v2".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Token information from Jupiter API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JupiterToken {
    /// Mint address
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// USD liquidity across pools
    #[serde(default)]
    pub liquidity: Option<f64>,
    #[serde(default)]
    pub stats24h: Option<TokenStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    #[serde(default)]
    pub buy_volume: Option<f64>,
    #[serde(default)]
    pub sell_volume: Option<f64>,
}

impl JupiterToken {
    pub fn is_verified(&self) -> bool {
        self.is_verified.unwrap_or(false) || self.tags.iter().any(|t| t == "verified" || t == "strict")
    }

    /// Liquidity, falling back to 24h volume when the pool figure is missing
    pub fn liquidity_proxy(&self) -> f64 {
        if let Some(l) = self.liquidity.filter(|l| *l > 0.0) {
            return l;
        }
        self.stats24h
            .as_ref()
            .map(|s| s.buy_volume.unwrap_or(0.0) + s.sell_volume.unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    pub fn to_candidate(&self) -> TokenCandidate {
        TokenCandidate {
            address: self.id.clone(),
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            decimals: self.decimals,
            liquidity: self.liquidity_proxy(),
            verified: self.is_verified(),
        }
    }
}

/// Jupiter token registry
#[derive(Debug, Clone)]
pub struct JupiterTokenRegistry {
    config: JupiterTokenConfig,
    http: Client,
}

impl JupiterTokenRegistry {
    pub fn with_config(config: JupiterTokenConfig) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketDataError::Network(e.to_string()))?;
        Ok(Self { config, http })
    }

    async fn search_raw(&self, query: &str) -> Result<Vec<JupiterToken>, RegistryError> {
        let url = format!("{}/search", self.config.token_api_url);
        let mut req = self.http.get(&url).query(&[("query", query)]);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| MarketDataError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MarketDataError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        // The API returns an array directly
        response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(format!("Failed to parse search results: {}", e)))
    }
}

#[async_trait]
impl TokenRegistry for JupiterTokenRegistry {
    async fn search(&self, tier: RegistryTier, query: &str) -> Result<Vec<TokenCandidate>, RegistryError> {
        let tokens = self.search_raw(query).await?;
        Ok(tokens
            .iter()
            .filter(|t| tier == RegistryTier::All || t.is_verified())
            .map(JupiterToken::to_candidate)
            .collect())
    }

    async fn lookup_mint(&self, mint: &str) -> Result<Option<TokenCandidate>, RegistryError> {
        let tokens = self.search_raw(mint).await?;
        Ok(tokens.iter().find(|t| t.id == mint).map(JupiterToken::to_candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_result() {
        let tokens: Vec<JupiterToken> = serde_json::from_value(json!([
            {
                "id": "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
                "name": "Bonk",
                "symbol": "Bonk",
                "decimals": 5,
                "isVerified": true,
                "tags": ["verified", "community"],
                "liquidity": 12500000.5,
                "stats24h": { "buyVolume": 1000.0, "sellVolume": 2000.0 }
            },
            {
                "id": "Fake1111111111111111111111111111111111111111",
                "name": "Bonk Inu",
                "symbol": "BONK",
                "decimals": 9,
                "stats24h": { "buyVolume": 10.0, "sellVolume": 5.0 }
            }
        ]))
        .unwrap();

        let real = tokens[0].to_candidate();
        assert!(real.verified);
        assert_eq!(real.liquidity, 12500000.5);
        assert_eq!(real.decimals, 5);

        let fake = tokens[1].to_candidate();
        assert!(!fake.verified);
        assert_eq!(fake.liquidity, 15.0);
    }
}
