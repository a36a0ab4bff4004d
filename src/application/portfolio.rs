//! Portfolio view: open positions marked to live prices plus today's realized PnL

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::orchestrator::FALLBACK_SOL_USD;
use super::price_feed::PriceFeed;
use crate::domain::portfolio::PortfolioSummary;
use crate::domain::token::lamports_to_sol;
use crate::ports::chain::{ChainError, ChainRpc};
use crate::ports::market_data::{PriceSource, RateSource};
use crate::ports::storage::{PositionStore, PositionStoreError};

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error(transparent)]
    Positions(#[from] PositionStoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub struct PortfolioService {
    positions: Arc<dyn PositionStore>,
    chain: Arc<dyn ChainRpc>,
    prices: Arc<dyn PriceSource>,
    rates: Arc<dyn RateSource>,
    feed: Option<PriceFeed>,
}

impl PortfolioService {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        chain: Arc<dyn ChainRpc>,
        prices: Arc<dyn PriceSource>,
        rates: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            positions,
            chain,
            prices,
            rates,
            feed: None,
        }
    }

    /// Prefer the feed's last polled prices over a fresh lookup
    pub fn with_feed(mut self, feed: PriceFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub async fn summary(&self, wallet: &str) -> Result<PortfolioSummary, PortfolioError> {
        let positions = self.positions.for_wallet(wallet).await?;
        let lamports = self.chain.get_balance(wallet).await?;

        let mut prices: HashMap<String, f64> = match &self.feed {
            Some(feed) => feed.all_prices().await,
            None => HashMap::new(),
        };
        let mut missing: Vec<String> = positions
            .iter()
            .filter(|p| p.is_open() && !prices.contains_key(&p.token.mint))
            .map(|p| p.token.mint.clone())
            .collect();
        missing.sort();
        missing.dedup();
        if !missing.is_empty() {
            match self.prices.get_prices(&missing).await {
                Ok(fresh) => prices.extend(fresh),
                Err(e) => tracing::warn!("Price lookup for {} mint(s) failed: {}", missing.len(), e),
            }
        }

        let rate = match self.rates.sol_usd().await {
            Ok(rate) => rate,
            Err(e) => {
                tracing::warn!("SOL/USD rate unavailable: {}", e);
                FALLBACK_SOL_USD
            }
        };

        Ok(PortfolioSummary::build(
            wallet,
            &positions,
            &prices,
            lamports_to_sol(lamports),
            rate,
            Utc::now().date_naive(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::domain::token::TokenIdentity;
    use crate::ports::market_data::MockRateSource;
    use crate::ports::mocks::{FakeChain, FakePriceSource, InMemoryPositionStore};
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn position(mint: &str) -> Position {
        Position::open("W", TokenIdentity::new(mint, mint, mint, 6), 4.0, 12.5, 0.33, 50.0).unwrap()
    }

    #[tokio::test]
    async fn test_summary_marks_open_positions() {
        let store = InMemoryPositionStore::new().with_position(position("M1")).with_position(position("M2"));
        let prices = FakePriceSource::new().with_price("M1", 5.0);
        let mut rates = MockRateSource::new();
        rates.expect_sol_usd().returning(|| Ok(100.0));

        let svc = PortfolioService::new(
            Arc::new(store),
            Arc::new(FakeChain::new().with_balance("W", 2_000_000_000)),
            Arc::new(prices),
            Arc::new(rates),
        );
        let s = svc.summary("W").await.unwrap();

        assert_eq!(s.open.len(), 2);
        let m1 = s.open.iter().find(|h| h.mint == "M1").unwrap();
        assert_relative_eq!(m1.pnl_pct.unwrap(), 25.0, epsilon = 1e-9);
        assert!(s.open.iter().find(|h| h.mint == "M2").unwrap().current_price.is_none());
        // 2 SOL * 100 + 12.5 * 5
        assert_relative_eq!(s.total_value_usd, 262.5, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_feed_cache_preferred_and_rate_fallback() {
        let source = FakePriceSource::new().with_price("M1", 6.0);
        let feed = PriceFeed::with_interval(Arc::new(source.clone()), Duration::from_secs(3600));
        feed.watch("M1").await;
        feed.poll_once().await;
        feed.stop().await;
        source.set_failing(true);

        let mut rates = MockRateSource::new();
        rates
            .expect_sol_usd()
            .returning(|| Err(crate::ports::market_data::MarketDataError::Network("down".into())));

        let svc = PortfolioService::new(
            Arc::new(InMemoryPositionStore::new().with_position(position("M1"))),
            Arc::new(FakeChain::new()),
            Arc::new(source),
            Arc::new(rates),
        )
        .with_feed(feed);
        let s = svc.summary("W").await.unwrap();
        assert_eq!(s.open[0].current_price, Some(6.0));
        assert_eq!(s.sol_usd_rate, FALLBACK_SOL_USD);
    }
}
