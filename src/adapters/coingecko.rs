//! CoinGecko SOL/USD rate source
//!
//! Caches the last good rate briefly. When the API fails and nothing is
//! cached, falls back to a configured constant so sizing never stalls.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::ports::market_data::{MarketDataError, PriceError, RateSource};

pub const DEFAULT_SOL_USD_FALLBACK: f64 = 150.0;

#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    pub api_url: String,
    pub cache_ttl: Duration,
    pub fallback_rate: f64,
    pub timeout: Duration,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.coingecko.com/api/v3".to_string(),
            cache_ttl: Duration::from_secs(60),
            fallback_rate: DEFAULT_SOL_USD_FALLBACK,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    solana: Option<UsdQuote>,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

pub struct CoinGeckoRate {
    config: CoinGeckoConfig,
    http: Client,
    cached: Mutex<Option<(f64, Instant)>>,
}

impl CoinGeckoRate {
    pub fn new() -> Result<Self, PriceError> {
        Self::with_config(CoinGeckoConfig::default())
    }

    pub fn with_config(config: CoinGeckoConfig) -> Result<Self, PriceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketDataError::Network(e.to_string()))?;
        Ok(Self {
            config,
            http,
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<f64, PriceError> {
        let url = format!("{}/simple/price", self.config.api_url);
        let response = self
            .http
            .get(&url)
            .query(&[("ids", "solana"), ("vs_currencies", "usd")])
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

        let body: SimplePrice = response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;
        parse_rate(body)
    }
}

fn parse_rate(body: SimplePrice) -> Result<f64, PriceError> {
    body.solana
        .and_then(|q| q.usd)
        .filter(|r| *r > 0.0 && r.is_finite())
        .ok_or_else(|| MarketDataError::Parse("missing solana.usd".into()))
}

#[async_trait]
impl RateSource for CoinGeckoRate {
    async fn sol_usd(&self) -> Result<f64, PriceError> {
        let mut cached = self.cached.lock().await;
        if let Some((rate, at)) = *cached {
            if at.elapsed() < self.config.cache_ttl {
                return Ok(rate);
            }
        }

        match self.fetch().await {
            Ok(rate) => {
                *cached = Some((rate, Instant::now()));
                Ok(rate)
            }
            Err(e) => {
                let rate = cached.map(|(r, _)| r).unwrap_or(self.config.fallback_rate);
                tracing::warn!("SOL/USD rate unavailable ({}), using {:.2}", e, rate);
                Ok(rate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        let body: SimplePrice = serde_json::from_str(r#"{"solana":{"usd":151.25}}"#).unwrap();
        assert_eq!(parse_rate(body).unwrap(), 151.25);

        let body: SimplePrice = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parse_rate(body).is_err());

        let body: SimplePrice = serde_json::from_str(r#"{"solana":{"usd":0}}"#).unwrap();
        assert!(parse_rate(body).is_err());
    }

    #[tokio::test]
    async fn test_falls_back_when_unreachable() {
        let rate = CoinGeckoRate::with_config(CoinGeckoConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rate.sol_usd().await.unwrap(), DEFAULT_SOL_USD_FALLBACK);
    }
}
