use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::ports::market_data::{MarketDataError, PriceError, PriceSource};

const JUPITER_PRICE_API: &str = "https://api.jup.ag/price/v3";

/// Jupiter Price API V3 client (USD prices, batched by mint)
#[derive(Debug, Clone)]
pub struct JupiterPriceClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
}

impl JupiterPriceClient {
    pub fn new(api_key: Option<String>) -> Result<Self, PriceError> {
        Self::with_url(JUPITER_PRICE_API, api_key, Duration::from_secs(8))
    }

    pub fn with_url(api_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, PriceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketDataError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PriceData {
    #[serde(rename = "usdPrice")]
    usd_price: Option<f64>,
}

/// Accepts both the bare map and the `{ "data": { ... } }` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceResponse {
    Wrapped { data: HashMap<String, Option<PriceData>> },
    Bare(HashMap<String, Option<PriceData>>),
}

impl PriceResponse {
    fn into_prices(self) -> HashMap<String, f64> {
        let map = match self {
            PriceResponse::Wrapped { data } => data,
            PriceResponse::Bare(map) => map,
        };
        map.into_iter()
            .filter_map(|(mint, d)| d.and_then(|d| d.usd_price).filter(|p| *p > 0.0).map(|p| (mint, p)))
            .collect()
    }
}

#[async_trait]
impl PriceSource for JupiterPriceClient {
    async fn get_prices(&self, mints: &[String]) -> Result<HashMap<String, f64>, PriceError> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }

        let mut req = self.http.get(&self.api_url).query(&[("ids", mints.join(","))]);
        if let Some(ref api_key) = self.api_key {
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

        let parsed: PriceResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;
        Ok(parsed.into_prices())
    }
}
