//! Jupiter Swap Types
//!
//! Request and response structures for the swap/v1 transaction builder.

use serde::{Deserialize, Serialize};

/// Priority fee policy sent with every swap build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityLevelWithMaxLamports {
    /// One of "medium", "high", "veryHigh"
    pub priority_level: String,
    pub max_lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizationFee {
    pub priority_level_with_max_lamports: PriorityLevelWithMaxLamports,
}

/// Request parameters for building a swap transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub user_public_key: String,
    /// The full quote response from /quote, echoed back unchanged
    pub quote_response: serde_json::Value,
    pub wrap_and_unwrap_sol: bool,
    pub dynamic_compute_unit_limit: bool,
    pub dynamic_slippage: bool,
    pub prioritization_fee_lamports: PrioritizationFee,
}

impl SwapRequest {
    pub fn new(user_public_key: String, quote_response: serde_json::Value) -> Self {
        Self {
            user_public_key,
            quote_response,
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            dynamic_slippage: true,
            prioritization_fee_lamports: PrioritizationFee {
                priority_level_with_max_lamports: PriorityLevelWithMaxLamports {
                    priority_level: "veryHigh".to_string(),
                    max_lamports: 1_000_000,
                },
            },
        }
    }

    pub fn with_priority(mut self, level: impl Into<String>, max_lamports: u64) -> Self {
        self.prioritization_fee_lamports.priority_level_with_max_lamports = PriorityLevelWithMaxLamports {
            priority_level: level.into(),
            max_lamports,
        };
        self
    }

    pub fn with_dynamic_slippage(mut self, enabled: bool) -> Self {
        self.dynamic_slippage = enabled;
        self
    }
}

/// Response from Jupiter swap API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 encoded serialized transaction ready to sign and send
    pub swap_transaction: String,
    #[serde(default)]
    pub last_valid_block_height: Option<u64>,
    #[serde(default)]
    pub prioritization_fee_lamports: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_swap_request_body_shape() {
        let req = SwapRequest::new("User111".into(), json!({ "outAmount": "1" }));
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["userPublicKey"], "User111");
        assert_eq!(body["wrapAndUnwrapSol"], true);
        assert_eq!(body["dynamicComputeUnitLimit"], true);
        assert_eq!(body["dynamicSlippage"], true);
        assert_eq!(
            body["prioritizationFeeLamports"]["priorityLevelWithMaxLamports"],
            json!({ "priorityLevel": "veryHigh", "maxLamports": 1_000_000 })
        );
        assert_eq!(body["quoteResponse"]["outAmount"], "1");
    }

    #[test]
    fn test_swap_response_without_block_height() {
        let resp: SwapResponse = serde_json::from_value(json!({ "swapTransaction": "AAAA" })).unwrap();
        assert_eq!(resp.last_valid_block_height, None);
        assert_eq!(resp.prioritization_fee_lamports, 0);
    }
}
