//! Jupiter API Client
//!
//! HTTP client for the Jupiter swap/v1 API: quote fetching and swap
//! transaction building. Each call is a single attempt with the HTTP status
//! mapped onto a typed `QuoteError`; the swap executor owns retries so a
//! failed call is never retried twice over.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::quote::{QuoteRequest, QuoteResponse};
use super::swap::{SwapRequest, SwapResponse};
use crate::ports::routing::{QuoteError, QuoteParams, QuoteService, RouteQuote, SwapTransaction};

/// Body fragments the quote API uses for an unroutable pair
const NO_ROUTE_MARKERS: [&str; 3] = ["No route", "ROUTE_NOT_FOUND", "could not find any routes"];

/// Jupiter API client configuration
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_base_url: String,
    /// Sent as `x-api-key` when present
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// "medium", "high" or "veryHigh"
    pub priority_level: String,
    pub max_priority_fee_lamports: u64,
    pub dynamic_slippage: bool,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
            priority_level: "veryHigh".to_string(),
            max_priority_fee_lamports: 1_000_000,
            dynamic_slippage: true,
        }
    }
}

/// Jupiter DEX aggregator client
#[derive(Debug, Clone)]
pub struct JupiterClient {
    config: JupiterConfig,
    http: Client,
}

impl JupiterClient {
    pub fn new() -> Result<Self, QuoteError> {
        Self::with_config(JupiterConfig::default())
    }

    pub fn with_config(config: JupiterConfig) -> Result<Self, QuoteError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) if !api_key.is_empty() => req.header("x-api-key", api_key),
            _ => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<serde_json::Value, QuoteError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| QuoteError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

/// Map a non-success HTTP response onto the routing error taxonomy
pub(crate) fn classify_status(status: StatusCode, body: String) -> QuoteError {
    if status == StatusCode::BAD_REQUEST && NO_ROUTE_MARKERS.iter().any(|m| body.contains(m)) {
        return QuoteError::NoRoute(body);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return QuoteError::RateLimited;
    }
    if status.is_server_error() {
        return QuoteError::Server {
            status: status.as_u16(),
            body,
        };
    }
    QuoteError::Api(format!("API error {}: {}", status, body))
}

#[async_trait]
impl QuoteService for JupiterClient {
    async fn get_quote(&self, params: &QuoteParams) -> Result<RouteQuote, QuoteError> {
        let url = format!("{}/quote", self.config.api_base_url);
        let request = QuoteRequest::new(
            params.input_mint.clone(),
            params.output_mint.clone(),
            params.amount,
            params.slippage_bps,
        );

        tracing::debug!(
            "Quote {} -> {} amount={} slippage={}bps",
            params.input_mint,
            params.output_mint,
            params.amount,
            params.slippage_bps
        );

        let raw = self.send(self.http.get(&url).query(&request.query_pairs())).await?;
        QuoteResponse::into_route(raw)
    }

    async fn build_swap_transaction(
        &self,
        user_public_key: &str,
        quote: &RouteQuote,
    ) -> Result<SwapTransaction, QuoteError> {
        let url = format!("{}/swap", self.config.api_base_url);
        let request = SwapRequest::new(user_public_key.to_string(), quote.raw.clone())
            .with_priority(&self.config.priority_level, self.config.max_priority_fee_lamports)
            .with_dynamic_slippage(self.config.dynamic_slippage);

        let raw = self.send(self.http.post(&url).json(&request)).await?;
        let swap: SwapResponse = serde_json::from_value(raw)
            .map_err(|e| QuoteError::InvalidResponse(format!("Failed to parse swap response: {}", e)))?;

        if swap.swap_transaction.is_empty() {
            return Err(QuoteError::InvalidResponse("No transaction returned from Jupiter".into()));
        }

        Ok(SwapTransaction {
            swap_transaction: swap.swap_transaction,
            last_valid_block_height: swap.last_valid_block_height,
        })
    }
}
