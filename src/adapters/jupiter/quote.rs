//! Jupiter Quote Types
//!
//! Request and response structures for the Jupiter swap/v1 quote API.

use serde::{Deserialize, Serialize};

use crate::ports::routing::{QuoteError, RouteQuote};

/// Request parameters for getting a swap quote
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Amount in base units (lamports for SOL)
    pub amount: u64,
    /// Slippage tolerance in basis points (1 = 0.01%)
    pub slippage_bps: u16,
    /// Route only through liquid intermediate tokens
    pub restrict_intermediate_tokens: bool,
}

impl QuoteRequest {
    pub fn new(input_mint: String, output_mint: String, amount: u64, slippage_bps: u16) -> Self {
        Self {
            input_mint,
            output_mint,
            amount,
            slippage_bps,
            restrict_intermediate_tokens: true,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("inputMint", self.input_mint.clone()),
            ("outputMint", self.output_mint.clone()),
            ("amount", self.amount.to_string()),
            ("slippageBps", self.slippage_bps.to_string()),
            ("restrictIntermediateTokens", self.restrict_intermediate_tokens.to_string()),
        ]
    }
}

/// Response from Jupiter quote API. Only the fields the pipeline reads are
/// typed; the whole payload is kept for the swap request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    #[serde(default)]
    pub other_amount_threshold: String,
    pub slippage_bps: u16,
    #[serde(default)]
    pub price_impact_pct: String,
}

impl QuoteResponse {
    pub fn input_amount(&self) -> u64 {
        self.in_amount.parse().unwrap_or(0)
    }

    pub fn output_amount(&self) -> u64 {
        self.out_amount.parse().unwrap_or(0)
    }

    pub fn price_impact(&self) -> f64 {
        self.price_impact_pct.parse().unwrap_or(0.0)
    }

    /// Parse a raw quote payload into the port's route quote
    pub fn into_route(raw: serde_json::Value) -> Result<RouteQuote, QuoteError> {
        let parsed: QuoteResponse = serde_json::from_value(raw.clone())
            .map_err(|e| QuoteError::InvalidResponse(format!("Failed to parse quote: {}", e)))?;

        Ok(RouteQuote {
            in_amount: parsed.input_amount(),
            out_amount: parsed.output_amount(),
            slippage_bps: parsed.slippage_bps,
            price_impact_pct: parsed.price_impact(),
            input_mint: parsed.input_mint,
            output_mint: parsed.output_mint,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_restrict_intermediate() {
        let req = QuoteRequest::new("A".into(), "B".into(), 1_000, 300);
        let pairs = req.query_pairs();
        assert!(pairs.contains(&("restrictIntermediateTokens", "true".to_string())));
        assert!(pairs.contains(&("slippageBps", "300".to_string())));
    }

    #[test]
    fn test_into_route_keeps_raw_payload() {
        let raw = json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "outputMint": "M1",
            "inAmount": "333333333",
            "outAmount": "12500000",
            "otherAmountThreshold": "12125000",
            "swapMode": "ExactIn",
            "slippageBps": 300,
            "priceImpactPct": "0.0012",
            "routePlan": []
        });
        let route = QuoteResponse::into_route(raw.clone()).unwrap();
        assert_eq!(route.in_amount, 333_333_333);
        assert_eq!(route.out_amount, 12_500_000);
        assert_eq!(route.slippage_bps, 300);
        assert_eq!(route.raw["routePlan"], json!([]));
        assert_eq!(route.raw, raw);
    }

    #[test]
    fn test_into_route_rejects_garbage() {
        let err = QuoteResponse::into_route(json!({ "error": "x" })).unwrap_err();
        assert!(matches!(err, QuoteError::InvalidResponse(_)));
    }
}
