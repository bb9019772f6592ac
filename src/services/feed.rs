//! Data-fetch collaborators
//!
//! The refresh controller only needs something it can ask for fresh data and
//! which may fail. [`FlakyFeed`] is the stand-in used by the demo: it takes a
//! while to answer and sometimes reports that the network is down.

use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;


/// Source of fresh display data
pub trait DataFetch: Send + Sync + 'static {
    /// Fetch the next piece of data to display
    fn fetch(&self) -> impl Future<Output = Result<String, FetchError>> + Send;
}


/// Simulated remote feed with configurable latency and failure rate
#[derive(Debug)]
pub struct FlakyFeed {
    /// Simulated round-trip time
    delay: Duration,

    /// Probability that a fetch fails, between 0 and 1
    failure_rate: f64,

    /// Number of fetches attempted so far
    fetches: AtomicU64,
}
//
impl FlakyFeed {
    /// Create a feed, clamping the failure rate into [0, 1]
    pub fn new(delay: Duration, failure_rate: f64) -> Self {
        FlakyFeed {
            delay,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            fetches: AtomicU64::new(0),
        }
    }

    /// Number of fetches attempted so far
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}
//
impl DataFetch for FlakyFeed {
    async fn fetch(&self) -> Result<String, FetchError> {
        tokio::time::sleep(self.delay).await;
        let attempt = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;

        let (failed, reading) = {
            let mut rng = rand::thread_rng();
            (rng.gen_bool(self.failure_rate), rng.gen_range(0..1000))
        };
        trace!(attempt, failed, "feed fetch");
        if failed {
            return Err(FetchError::Network("network down".to_owned()));
        }
        Ok(format!("Reading #{attempt}: {reading}"))
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    /// Check that a reliable feed always answers
    #[tokio::test(start_paused = true)]
    async fn reliable_feed() {
        let feed = FlakyFeed::new(Duration::from_millis(100), 0.0);
        for attempt in 1..=3 {
            let reading = feed.fetch().await.unwrap();
            assert!(reading.starts_with(&format!("Reading #{attempt}: ")));
        }
        assert_eq!(feed.fetches(), 3);
    }

    /// Check that a broken feed always fails, and still counts attempts
    #[tokio::test(start_paused = true)]
    async fn broken_feed() {
        let feed = FlakyFeed::new(Duration::ZERO, 7.0);
        assert_eq!(
            feed.fetch().await,
            Err(FetchError::Network("network down".to_owned()))
        );
        assert_eq!(feed.fetches(), 1);
    }
}
