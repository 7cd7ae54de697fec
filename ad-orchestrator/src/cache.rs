use crate::clock::Clock;
use crate::types::TrendSet;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the single current `TrendSet`. Readers share the lock.
pub struct TrendCache {
    current: RwLock<Option<TrendSet>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl TrendCache {
    pub fn new(window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: RwLock::new(None),
            window: Duration::seconds(window_secs as i64),
            clock,
        }
    }

    /// The current set, if it is younger than the cache window.
    pub async fn fresh(&self) -> Option<TrendSet> {
        let now = self.clock.now();
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|set| !set.topics.is_empty() && set.age_at(now) < self.window)
            .cloned()
    }

    /// Replaces the current set wholesale.
    pub async fn store(&self, set: TrendSet) {
        *self.current.write().await = Some(set);
    }

    /// The current set regardless of age.
    pub async fn snapshot(&self) -> Option<TrendSet> {
        self.current.read().await.clone()
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|set| set.fetched_at + self.window)
    }
}
