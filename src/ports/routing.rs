use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing/quote service error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    /// The pair is genuinely unroutable; never retried
    #[error("No route found: {0}")]
    NoRoute(String),

    #[error("Rate limited by routing service")]
    RateLimited,

    #[error("Routing service error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl QuoteError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QuoteError::RateLimited | QuoteError::Server { .. } | QuoteError::Network(_)
        )
    }
}

/// Quote request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteParams {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in base units
    pub amount: u64,
    pub slippage_bps: u16,
}

/// A proposed route with its expected output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteQuote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: f64,
    /// The service's full quote payload, echoed back when building the swap
    pub raw: serde_json::Value,
}

/// A signable transaction built for an accepted quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapTransaction {
    /// Base64-encoded, bincode-serialized unsigned versioned transaction
    pub swap_transaction: String,
    pub last_valid_block_height: Option<u64>,
}

#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn get_quote(&self, params: &QuoteParams) -> Result<RouteQuote, QuoteError>;

    async fn build_swap_transaction(
        &self,
        user_public_key: &str,
        quote: &RouteQuote,
    ) -> Result<SwapTransaction, QuoteError>;
}
