//! Price Feed
//!
//! Polls the price source for the watched mints and publishes one
//! `PriceUpdate` per mint per tick on a broadcast channel. The poller task
//! exists only while the watch set is non-empty.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::ports::market_data::PriceSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub mint: String,
    pub price: f64,
    pub previous: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct FeedState {
    watched: BTreeSet<String>,
    last: HashMap<String, f64>,
    poller: Option<JoinHandle<()>>,
}

struct Inner {
    source: Arc<dyn PriceSource>,
    interval: Duration,
    state: Mutex<FeedState>,
    updates: broadcast::Sender<PriceUpdate>,
}

#[derive(Clone)]
pub struct PriceFeed {
    inner: Arc<Inner>,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self::with_interval(source, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(source: Arc<dyn PriceSource>, interval: Duration) -> Self {
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                source,
                interval,
                state: Mutex::new(FeedState::default()),
                updates,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceUpdate> {
        self.inner.updates.subscribe()
    }

    /// Add a mint; the first watched mint starts polling
    pub async fn watch(&self, mint: &str) {
        let mut state = self.inner.state.lock().await;
        if state.watched.insert(mint.to_string()) {
            tracing::debug!("Watching {}", mint);
        }
        let running = state.poller.as_ref().is_some_and(|h| !h.is_finished());
        if !running {
            state.poller = Some(spawn_poller(Arc::downgrade(&self.inner), self.inner.interval));
            tracing::info!("Price feed started ({:?} interval)", self.inner.interval);
        }
    }

    /// Remove a mint; removing the last one stops polling
    pub async fn unwatch(&self, mint: &str) {
        let mut state = self.inner.state.lock().await;
        state.watched.remove(mint);
        if state.watched.is_empty() {
            if let Some(handle) = state.poller.take() {
                handle.abort();
                tracing::info!("Price feed stopped (watch set empty)");
            }
        }
    }

    /// Clear the watch set and halt polling
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        state.watched.clear();
        if let Some(handle) = state.poller.take() {
            handle.abort();
        }
    }

    pub async fn is_polling(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.poller.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn watched(&self) -> Vec<String> {
        self.inner.state.lock().await.watched.iter().cloned().collect()
    }

    /// Last polled price
    pub async fn get_price(&self, mint: &str) -> Option<f64> {
        self.inner.state.lock().await.last.get(mint).copied()
    }

    pub async fn all_prices(&self) -> HashMap<String, f64> {
        self.inner.state.lock().await.last.clone()
    }

    /// One polling round; returns how many updates were published
    pub async fn poll_once(&self) -> usize {
        self.inner.poll_once().await
    }
}

impl Inner {
    async fn poll_once(&self) -> usize {
        let mints: Vec<String> = self.state.lock().await.watched.iter().cloned().collect();
        if mints.is_empty() {
            return 0;
        }

        let prices = match self.source.get_prices(&mints).await {
            Ok(prices) => prices,
            Err(e) => {
                // one bad mint can sink a batch; fall back to asking one at a time
                tracing::warn!("Batch price fetch failed: {}", e);
                let mut prices = HashMap::new();
                for mint in &mints {
                    match self.source.get_prices(std::slice::from_ref(mint)).await {
                        Ok(p) => prices.extend(p),
                        Err(e) => tracing::debug!("No price for {}: {}", mint, e),
                    }
                }
                prices
            }
        };

        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut published = 0;
        for mint in &mints {
            // skip mints unwatched while the fetch was in flight
            if !state.watched.contains(mint) {
                continue;
            }
            let Some(&price) = prices.get(mint) else {
                continue;
            };
            let previous = state.last.insert(mint.clone(), price);
            // no subscribers is fine
            let _ = self.updates.send(PriceUpdate {
                mint: mint.clone(),
                price,
                previous,
                timestamp: now,
            });
            published += 1;
        }
        published
    }
}

fn spawn_poller(inner: Weak<Inner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.poll_once().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::FakePriceSource;

    #[tokio::test]
    async fn test_poll_publishes_only_priced_mints() {
        let source = FakePriceSource::new().with_price("A", 1.0).with_price("B", 2.0);
        let feed = PriceFeed::with_interval(Arc::new(source.clone()), Duration::from_secs(3600));
        let mut rx = feed.subscribe();

        feed.watch("A").await;
        feed.watch("C").await;
        // drain the poller's immediate first tick
        let first = rx.recv().await.unwrap();
        assert_eq!(first.mint, "A");
        assert_eq!(first.previous, None);

        source.set_price("A", 1.5);
        assert_eq!(feed.poll_once().await, 1);
        let update = rx.recv().await.unwrap();
        assert_eq!(update.price, 1.5);
        assert_eq!(update.previous, Some(1.0));
        assert_eq!(feed.get_price("C").await, None);
        feed.stop().await;
    }

    #[tokio::test]
    async fn test_failed_fetch_publishes_nothing() {
        let source = FakePriceSource::new().with_price("A", 1.0);
        let feed = PriceFeed::with_interval(Arc::new(source.clone()), Duration::from_secs(3600));
        feed.watch("A").await;
        feed.stop().await;
        feed.inner.state.lock().await.watched.insert("A".to_string());

        source.set_failing(true);
        assert_eq!(feed.poll_once().await, 0);
    }

    #[tokio::test]
    async fn test_empty_watch_set_stops_polling() {
        let source = FakePriceSource::new();
        let feed = PriceFeed::with_interval(Arc::new(source), Duration::from_millis(10));
        assert!(!feed.is_polling().await);

        feed.watch("A").await;
        feed.watch("B").await;
        assert!(feed.is_polling().await);

        feed.unwatch("A").await;
        assert!(feed.is_polling().await);
        feed.unwatch("B").await;
        assert!(!feed.is_polling().await);

        feed.watch("C").await;
        assert!(feed.is_polling().await);
        feed.stop().await;
        assert!(!feed.is_polling().await);
        assert!(feed.watched().await.is_empty());
    }
}
