//! GoPlus Security Client
//!
//! Fetches Solana token security facts from GoPlus `token_security`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::types::SecurityResponse;
use crate::domain::safety::SecurityFacts;
use crate::ports::market_data::{MarketDataError, SecurityError, SecurityService};

#[derive(Debug, Clone)]
pub struct GoPlusConfig {
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for GoPlusConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.gopluslabs.io/api/v1".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoPlusClient {
    config: GoPlusConfig,
    http: Client,
}

impl GoPlusClient {
    pub fn new() -> Result<Self, SecurityError> {
        Self::with_config(GoPlusConfig::default())
    }

    pub fn with_config(config: GoPlusConfig) -> Result<Self, SecurityError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketDataError::Network(e.to_string()))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SecurityService for GoPlusClient {
    async fn get_security(&self, mint: &str) -> Result<Option<SecurityFacts>, SecurityError> {
        let url = format!("{}/solana/token_security", self.config.api_url);

        let response = self
            .http
            .get(&url)
            .query(&[("contract_addresses", mint)])
            .send()
            .await
            .map_err(|e| MarketDataError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            tracing::warn!("GoPlus API error {} for {}", status, mint);
            return Err(MarketDataError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: SecurityResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(format!("Failed to parse GoPlus response: {}", e)))?;

        Ok(body.record(mint).map(|t| t.to_facts()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GoPlusClient::new().unwrap();
        assert!(client.config.api_url.starts_with("https://"));
    }
}
