use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::safety::SecurityFacts;
use crate::domain::token::TokenCandidate;

/// Error type shared by the registry, price, rate and security sources
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("REST API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Data parsing error: {0}")]
    Parse(String),
}

impl MarketDataError {
    pub fn is_transient(&self) -> bool {
        match self {
            MarketDataError::Network(_) => true,
            MarketDataError::Api { status, .. } => *status == 429 || *status >= 500,
            MarketDataError::Parse(_) => false,
        }
    }
}

pub type RegistryError = MarketDataError;
pub type PriceError = MarketDataError;
pub type SecurityError = MarketDataError;

/// Which registry tier to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryTier {
    /// Curated/verified tokens only
    Strict,
    /// Everything the registry knows, verified or not
    All,
}

/// Token registry port
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Candidates matching `query`, best-ranked first
    async fn search(&self, tier: RegistryTier, query: &str) -> Result<Vec<TokenCandidate>, RegistryError>;

    /// Registry entry for an exact mint address
    async fn lookup_mint(&self, mint: &str) -> Result<Option<TokenCandidate>, RegistryError>;
}

/// USD price source for a batch of mints
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Prices keyed by mint. Mints the source has no price for are absent.
    async fn get_prices(&self, mints: &[String]) -> Result<HashMap<String, f64>, PriceError>;
}

/// SOL -> USD conversion rate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn sol_usd(&self) -> Result<f64, PriceError>;
}

/// Token security metadata service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityService: Send + Sync {
    /// Raw security facts, `None` when the service has no record for the mint
    async fn get_security(&self, mint: &str) -> Result<Option<SecurityFacts>, SecurityError>;
}
