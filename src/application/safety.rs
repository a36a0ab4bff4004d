//! Safety Evaluator
//!
//! Fetches security facts for a mint and scores them. Missing data and
//! upstream failures both produce the cautious Unknown assessment; only the
//! former is cached, so a flaky service is asked again next time.

use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::domain::safety::{score_token, SafetyAssessment};
use crate::ports::market_data::SecurityService;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

pub struct SafetyEvaluator {
    security: Arc<dyn SecurityService>,
    cache: RwLock<HashMap<String, (SafetyAssessment, Instant)>>,
    ttl: Duration,
}

impl SafetyEvaluator {
    pub fn new(security: Arc<dyn SecurityService>) -> Self {
        Self::with_ttl(security, DEFAULT_CACHE_TTL)
    }

    /// A zero TTL disables caching
    pub fn with_ttl(security: Arc<dyn SecurityService>, ttl: Duration) -> Self {
        Self {
            security,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Assess `mint`. `token_age` adds the young-token penalty when known.
    pub async fn evaluate(&self, mint: &str, token_age: Option<ChronoDuration>) -> SafetyAssessment {
        if let Some(cached) = self.cached(mint).await {
            return cached;
        }

        let assessment = match self.security.get_security(mint).await {
            Ok(Some(facts)) => score_token(mint, &facts, token_age),
            Ok(None) => {
                tracing::warn!("No security record for {}, using Unknown assessment", mint);
                SafetyAssessment::unknown(mint)
            }
            Err(e) => {
                tracing::warn!("Security lookup for {} failed: {}", mint, e);
                return SafetyAssessment::unknown(mint);
            }
        };

        tracing::info!(
            "Safety {}: score {} ({}) risks={:?}",
            mint,
            assessment.score,
            assessment.label,
            assessment.risks
        );

        if !self.ttl.is_zero() {
            self.cache
                .write()
                .await
                .insert(mint.to_string(), (assessment.clone(), Instant::now()));
        }
        assessment
    }

    async fn cached(&self, mint: &str) -> Option<SafetyAssessment> {
        let cache = self.cache.read().await;
        cache
            .get(mint)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(a, _)| a.clone())
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::safety::{RiskLevel, SecurityFacts, UNKNOWN_SCORE};
    use crate::ports::market_data::{MarketDataError, MockSecurityService};
    use mockall::predicate::eq;

    fn clean_facts() -> SecurityFacts {
        SecurityFacts {
            top10_holder_pct: 20.0,
            total_liquidity_usd: 50_000.0,
            lp_locked: true,
            holder_count: 900,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scores_and_caches() {
        let mut mock = MockSecurityService::new();
        mock.expect_get_security()
            .with(eq("M1"))
            .times(1)
            .returning(|_| Ok(Some(clean_facts())));

        let evaluator = SafetyEvaluator::new(Arc::new(mock));
        let first = evaluator.evaluate("M1", None).await;
        let second = evaluator.evaluate("M1", None).await;
        assert_eq!(first.level, RiskLevel::Safe);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failure_is_unknown_and_not_cached() {
        let mut mock = MockSecurityService::new();
        mock.expect_get_security().times(2).returning(|_| {
            Err(MarketDataError::Api {
                status: 503,
                body: String::new(),
            })
        });

        let evaluator = SafetyEvaluator::new(Arc::new(mock));
        for _ in 0..2 {
            let a = evaluator.evaluate("M1", None).await;
            assert_eq!(a.score, UNKNOWN_SCORE);
            assert_eq!(a.level, RiskLevel::Warn);
            assert!(!a.data_available);
        }
    }

    #[tokio::test]
    async fn test_missing_record_is_cached_unknown() {
        let mut mock = MockSecurityService::new();
        mock.expect_get_security().times(1).returning(|_| Ok(None));

        let evaluator = SafetyEvaluator::new(Arc::new(mock));
        assert_eq!(evaluator.evaluate("M1", None).await.label, "Unknown");
        assert_eq!(evaluator.evaluate("M1", None).await.label, "Unknown");
    }

    #[tokio::test]
    async fn test_honeypot_blocks() {
        let mut mock = MockSecurityService::new();
        mock.expect_get_security().returning(|_| {
            Ok(Some(SecurityFacts {
                has_transfer_hook: true,
                ..Default::default()
            }))
        });

        let evaluator = SafetyEvaluator::with_ttl(Arc::new(mock), Duration::ZERO);
        let a = evaluator.evaluate("M1", None).await;
        assert_eq!(a.score, 100);
        assert!(a.is_blocked());
    }
}
