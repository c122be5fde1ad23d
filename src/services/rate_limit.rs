//! Per-service minimum-interval gate: at most one call to a given
//! external service begins per `min_interval`, shared across whatever
//! concurrent tasks hold an `Arc<RateLimiter>`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct RateLimiter {
    min_interval: Duration,
    next_allowed: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Arc<Self> {
        Arc::new(Self { min_interval, next_allowed: Mutex::new(Instant::now()) })
    }

    /// Semantic Scholar: >=1s between calls with an API key, >=3s
    /// without one.
    pub fn semantic_scholar(has_api_key: bool) -> Arc<Self> {
        Self::new(Duration::from_secs(if has_api_key { 1 } else { 3 }))
    }

    /// OpenAlex's polite pool has no documented hard minimum interval;
    /// this crate self-throttles conservatively regardless.
    pub fn openalex() -> Arc<Self> {
        Self::new(Duration::from_millis(150))
    }

    /// arXiv has no hard client limit, but implementations must
    /// self-throttle per the concurrency & resource model.
    pub fn arxiv() -> Arc<Self> {
        Self::new(Duration::from_millis(300))
    }

    /// DBLP has no documented hard limit either; throttled the same as
    /// arXiv.
    pub fn dblp() -> Arc<Self> {
        Self::new(Duration::from_millis(300))
    }

    /// Block until it is this caller's turn, then reserve the next
    /// slot.
    pub async fn acquire(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }
}
