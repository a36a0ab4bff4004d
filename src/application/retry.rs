//! Bounded retry for transient collaborator failures

use std::future::Future;
use std::time::Duration;

use crate::ports::chain::ChainError;
use crate::ports::market_data::MarketDataError;
use crate::ports::routing::QuoteError;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for QuoteError {
    fn is_transient(&self) -> bool {
        QuoteError::is_transient(self)
    }
}

impl Retryable for ChainError {
    fn is_transient(&self) -> bool {
        ChainError::is_transient(self)
    }
}

impl Retryable for MarketDataError {
    fn is_transient(&self) -> bool {
        MarketDataError::is_transient(self)
    }
}

/// Fixed attempt count with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!("{} failed (attempt {}/{}): {}", label, attempt, attempts, e);
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
