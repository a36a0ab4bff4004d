//! Token Resolver
//!
//! Maps a free-form query (ticker, name or mint address) to one tradeable
//! token. Ambiguity is settled by liquidity ranking, never by asking the
//! user, and routability is checked with a trial quote but never blocks.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::token::{is_address_like, Resolution, TokenCandidate, TokenIdentity, SOL_MINT};
use crate::ports::market_data::{RegistryTier, TokenRegistry};
use crate::ports::routing::{QuoteError, QuoteParams, QuoteService};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Token not found: {0}")]
    NotFound(String),

    #[error("Empty token query")]
    EmptyQuery,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Check the top candidates with a trial quote
    pub verify_routes: bool,
    pub trial_amount_lamports: u64,
    pub trial_slippage_bps: u16,
    pub max_alternatives: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            verify_routes: true,
            trial_amount_lamports: 10_000_000,
            trial_slippage_bps: 300,
            max_alternatives: 5,
        }
    }
}

pub struct TokenResolver {
    registry: Arc<dyn TokenRegistry>,
    quotes: Arc<dyn QuoteService>,
    config: ResolverConfig,
}

impl TokenResolver {
    pub fn new(registry: Arc<dyn TokenRegistry>, quotes: Arc<dyn QuoteService>) -> Self {
        Self::with_config(registry, quotes, ResolverConfig::default())
    }

    pub fn with_config(registry: Arc<dyn TokenRegistry>, quotes: Arc<dyn QuoteService>, config: ResolverConfig) -> Self {
        Self {
            registry,
            quotes,
            config,
        }
    }

    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let query = query.trim().trim_start_matches('$').trim();
        if query.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }

        if is_address_like(query) {
            return Ok(self.resolve_address(query).await);
        }

        let candidates = self.ranked_candidates(query).await;
        if candidates.is_empty() {
            tracing::info!("No registry match for '{}'", query);
            return Err(ResolveError::NotFound(query.to_string()));
        }

        let (chosen, routable) = if self.config.verify_routes {
            self.pick_routable(&candidates).await
        } else {
            (0, None)
        };

        let token = candidates[chosen].identity();
        let alternatives = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != chosen)
            .map(|(_, c)| c.clone())
            .take(self.config.max_alternatives)
            .collect();

        tracing::info!(
            "Resolved '{}' -> {} ({}) of {} candidate(s)",
            query,
            token.symbol,
            token.mint,
            candidates.len()
        );

        Ok(Resolution {
            token,
            duplicates: candidates.len() > 1,
            alternatives,
            routable,
        })
    }

    /// Literal mints are trusted even when the registry does not know them
    async fn resolve_address(&self, mint: &str) -> Resolution {
        let token = match self.registry.lookup_mint(mint).await {
            Ok(Some(candidate)) => candidate.identity(),
            Ok(None) => TokenIdentity::unknown(mint),
            Err(e) => {
                tracing::warn!("Registry lookup for {} failed: {}", mint, e);
                TokenIdentity::unknown(mint)
            }
        };
        Resolution {
            token,
            duplicates: false,
            alternatives: Vec::new(),
            routable: None,
        }
    }

    /// Strict tier first, broad tier only when strict has no match
    async fn ranked_candidates(&self, query: &str) -> Vec<TokenCandidate> {
        for tier in [RegistryTier::Strict, RegistryTier::All] {
            match self.registry.search(tier, query).await {
                Ok(found) => {
                    let matches = match_query(found, query);
                    if !matches.is_empty() {
                        return rank(matches);
                    }
                }
                Err(e) => tracing::warn!("Registry search ({:?}) failed: {}", tier, e),
            }
        }
        Vec::new()
    }

    /// Index of the first candidate that answers a trial quote. A transient
    /// quote failure accepts the candidate unverified; when every candidate
    /// is unroutable the top one is returned anyway.
    async fn pick_routable(&self, candidates: &[TokenCandidate]) -> (usize, Option<bool>) {
        for (i, candidate) in candidates.iter().enumerate().take(self.config.max_alternatives + 1) {
            if candidate.address == SOL_MINT {
                return (i, Some(true));
            }
            let params = QuoteParams {
                input_mint: SOL_MINT.to_string(),
                output_mint: candidate.address.clone(),
                amount: self.config.trial_amount_lamports,
                slippage_bps: self.config.trial_slippage_bps,
            };
            match self.quotes.get_quote(&params).await {
                Ok(_) => return (i, Some(true)),
                Err(QuoteError::NoRoute(_)) => {
                    tracing::debug!("Dropping unroutable candidate {}", candidate.address);
                }
                Err(e) => {
                    tracing::debug!("Trial quote for {} inconclusive: {}", candidate.address, e);
                    return (i, None);
                }
            }
        }
        (0, Some(false))
    }
}

/// Exact ticker matches, else exact name matches. Case-insensitive, one entry per mint.
fn match_query(found: Vec<TokenCandidate>, query: &str) -> Vec<TokenCandidate> {
    let by_symbol: Vec<_> = found.iter().filter(|c| c.symbol.eq_ignore_ascii_case(query)).cloned().collect();
    let matches = if by_symbol.is_empty() {
        found.into_iter().filter(|c| c.name.eq_ignore_ascii_case(query)).collect()
    } else {
        by_symbol
    };

    let mut seen = HashSet::new();
    matches.into_iter().filter(|c| seen.insert(c.address.clone())).collect()
}

/// Highest liquidity first; address breaks ties so the order is total
fn rank(mut candidates: Vec<TokenCandidate>) -> Vec<TokenCandidate> {
    candidates.sort_by(|a, b| {
        b.liquidity
            .partial_cmp(&a.liquidity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::DEFAULT_UNKNOWN_DECIMALS;
    use crate::ports::mocks::{FakeQuoteService, FakeRegistry};

    fn candidate(address: &str, symbol: &str, liquidity: f64) -> TokenCandidate {
        TokenCandidate {
            address: address.to_string(),
            symbol: symbol.to_string(),
            name: format!("{} Token", symbol),
            decimals: 6,
            liquidity,
            verified: true,
        }
    }

    fn resolver(registry: FakeRegistry, quotes: FakeQuoteService) -> TokenResolver {
        TokenResolver::new(Arc::new(registry), Arc::new(quotes))
    }

    #[tokio::test]
    async fn test_highest_liquidity_wins() {
        let registry = FakeRegistry::new()
            .with_strict(candidate("MintLow", "PEPE", 1_000.0))
            .with_strict(candidate("MintHigh", "PEPE", 50_000.0))
            .with_strict(candidate("MintPep2", "PEPE2", 90_000.0));
        let r = resolver(registry, FakeQuoteService::new());

        for _ in 0..3 {
            let res = r.resolve("pepe").await.unwrap();
            assert_eq!(res.token.mint, "MintHigh");
            assert!(res.duplicates);
            assert_eq!(res.alternatives.len(), 1);
            assert_eq!(res.routable, Some(true));
        }
    }

    #[tokio::test]
    async fn test_unroutable_top_candidate_skipped() {
        let registry = FakeRegistry::new()
            .with_strict(candidate("MintA", "DOG", 9_000.0))
            .with_strict(candidate("MintB", "DOG", 100.0));
        let quotes = FakeQuoteService::new().with_unroutable("MintA");
        let res = resolver(registry, quotes).resolve("$DOG").await.unwrap();
        assert_eq!(res.token.mint, "MintB");
        assert_eq!(res.alternatives[0].address, "MintA");
    }

    #[tokio::test]
    async fn test_all_unroutable_falls_back_to_top() {
        let registry = FakeRegistry::new()
            .with_strict(candidate("MintA", "DOG", 9_000.0))
            .with_strict(candidate("MintB", "DOG", 100.0));
        let quotes = FakeQuoteService::new().with_unroutable("MintA").with_unroutable("MintB");
        let res = resolver(registry, quotes).resolve("DOG").await.unwrap();
        assert_eq!(res.token.mint, "MintA");
        assert_eq!(res.routable, Some(false));
    }

    #[tokio::test]
    async fn test_broad_tier_and_name_fallback() {
        let registry = FakeRegistry::new().with_unverified(TokenCandidate {
            name: "dogwifhat".to_string(),
            ..candidate("MintWif", "WIF", 10.0)
        });
        let r = resolver(registry.clone(), FakeQuoteService::new());

        assert_eq!(r.resolve("WIF").await.unwrap().token.mint, "MintWif");
        assert_eq!(r.resolve("DogWifHat").await.unwrap().token.mint, "MintWif");
        let tiers: Vec<_> = registry.get_calls().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tiers[..2], [RegistryTier::Strict, RegistryTier::All]);
    }

    #[tokio::test]
    async fn test_not_found() {
        let r = resolver(FakeRegistry::new(), FakeQuoteService::new());
        assert_eq!(r.resolve("NOPE").await.unwrap_err(), ResolveError::NotFound("NOPE".into()));
        assert_eq!(r.resolve("  $ ").await.unwrap_err(), ResolveError::EmptyQuery);
    }

    #[tokio::test]
    async fn test_unknown_address_accepted() {
        let mint = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
        let r = resolver(FakeRegistry::new().failing(), FakeQuoteService::new());
        let res = r.resolve(mint).await.unwrap();
        assert_eq!(res.token.mint, mint);
        assert_eq!(res.token.symbol, "UNKNOWN");
        assert_eq!(res.token.decimals, DEFAULT_UNKNOWN_DECIMALS);
    }
}
