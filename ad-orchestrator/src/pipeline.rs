use crate::cache::TrendCache;
use crate::clock::Clock;
use crate::filter::{ContentFilter, FilterConfig};
use crate::rate_limit::RateLimiter;
use crate::traits::TrendSource;
use crate::types::{OrchestratorError, Result, TrendSet, TrendTopic};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const FALLBACK_SOURCE: &str = "curated_fallback";

pub const DEFAULT_FALLBACK_TOPICS: &[&str] = &[
    "Summer vacation destinations",
    "Ice cream flavors and recipes",
    "Pet adoption and care",
    "Music festivals and concerts",
    "Art exhibitions and galleries",
    "Food trucks and street food",
    "Beach activities and water sports",
    "Garden parties and outdoor dining",
    "Street art and murals",
    "Local farmers markets",
    "Home workout routines",
    "Healthy cooking and nutrition",
    "DIY crafts and hobbies",
    "Photography tips and techniques",
    "Book recommendations and reviews",
    "Coffee shop culture",
    "Hiking trails and nature",
    "Board games and puzzles",
    "Sustainable living tips",
    "Mindfulness and meditation",
];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_window_secs: u64,
    pub min_source_interval_secs: u64,
    pub source_timeout_secs: u64,
    pub filter: FilterConfig,
    pub fallback_topics: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_window_secs: 900,
            min_source_interval_secs: 60,
            source_timeout_secs: 15,
            filter: FilterConfig::default(),
            fallback_topics: DEFAULT_FALLBACK_TOPICS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { accepted: usize },
    NothingAccepted { candidates: usize },
    Failed { reason: String },
    RateLimited,
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttempt {
    pub source: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub name: String,
    pub external: bool,
    pub configured: bool,
}

/// Point-in-time view of the pipeline's internals, for diagnostics only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDebug {
    pub cache_valid: bool,
    pub cached_topics_count: usize,
    pub cache_source: Option<String>,
    pub cache_age_seconds: Option<i64>,
    pub cache_expiry: Option<DateTime<Utc>>,
    pub last_request_time: Option<DateTime<Utc>>,
    pub min_request_interval: i64,
    pub rate_limit_wait_seconds: i64,
    pub last_attempt: Option<SourceAttempt>,
    pub next_external_source: Option<String>,
    pub sources: Vec<SourceInfo>,
    pub current_time: DateTime<Utc>,
}

/// Ordered fallback across trend sources, behind a TTL cache and a shared
/// rate limiter. `get_trends` never fails.
pub struct TrendPipeline {
    sources: Vec<Box<dyn TrendSource>>,
    filter: ContentFilter,
    limiter: RateLimiter,
    cache: TrendCache,
    fallback_topics: Vec<String>,
    max_topics: usize,
    source_timeout: std::time::Duration,
    // Serializes cache misses so parallel callers share one fetch cycle.
    fetch_lock: Mutex<()>,
    // First external source to try on the next cycle.
    cursor: AtomicUsize,
    last_attempt: std::sync::Mutex<Option<SourceAttempt>>,
    clock: Arc<dyn Clock>,
}

impl TrendPipeline {
    pub fn new(config: PipelineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let filter = ContentFilter::new(&config.filter)?;

        let fallback_topics: Vec<String> = config
            .fallback_topics
            .iter()
            .filter_map(|topic| filter.check(topic).accepted())
            .collect();
        if fallback_topics.is_empty() {
            return Err(OrchestratorError::Config(
                "curated fallback topics are empty after filtering".to_string(),
            ));
        }
        if fallback_topics.len() < config.fallback_topics.len() {
            warn!(
                "{} curated fallback topics were rejected by the content filter",
                config.fallback_topics.len() - fallback_topics.len()
            );
        }

        Ok(Self {
            sources: Vec::new(),
            filter,
            limiter: RateLimiter::new(config.min_source_interval_secs, clock.clone()),
            cache: TrendCache::new(config.cache_window_secs, clock.clone()),
            fallback_topics,
            max_topics: config.filter.max_per_source,
            source_timeout: std::time::Duration::from_secs(config.source_timeout_secs),
            fetch_lock: Mutex::new(()),
            cursor: AtomicUsize::new(0),
            last_attempt: std::sync::Mutex::new(None),
            clock,
        })
    }

    /// Appends a source at the lowest priority so far.
    pub fn add_source(&mut self, source: Box<dyn TrendSource>) {
        info!(
            "Adding trend source: {} ({})",
            source.source_name(),
            if source.is_external() { "external" } else { "local" }
        );
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: Box<dyn TrendSource>) -> Self {
        self.add_source(source);
        self
    }

    pub async fn get_trends(&self) -> TrendSet {
        if let Some(set) = self.cache.fresh().await {
            debug!("Serving {} cached trends from {}", set.topics.len(), set.source);
            return set;
        }

        let _guard = self.fetch_lock.lock().await;

        // Another caller may have refreshed the cache while we waited.
        if let Some(set) = self.cache.fresh().await {
            return set;
        }

        let set = self.run_cycle().await;
        info!(
            "Cached {} trends from {}{}",
            set.topics.len(),
            set.source,
            if set.fallback { " (fallback)" } else { "" }
        );
        self.cache.store(set.clone()).await;
        set
    }

    pub fn age_of(&self, set: &TrendSet) -> Duration {
        set.age_at(self.clock.now())
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    pub async fn debug_info(&self) -> PipelineDebug {
        let now = self.clock.now();
        let snapshot = self.cache.snapshot().await;
        let cache_valid = self.cache.fresh().await.is_some();
        let cache_expiry = self.cache.expires_at().await;
        let last_attempt = self.last_attempt.lock().unwrap_or_else(|p| p.into_inner()).clone();

        let cursor = self.cursor.load(Ordering::Acquire);
        let next_external_source = self
            .sources
            .iter()
            .enumerate()
            .find(|(i, s)| *i >= cursor && s.is_external() && s.is_configured())
            .map(|(_, s)| s.source_name().to_string());

        PipelineDebug {
            cache_valid,
            cached_topics_count: snapshot.as_ref().map_or(0, |s| s.topics.len()),
            cache_source: snapshot.as_ref().map(|s| s.source.clone()),
            cache_age_seconds: snapshot.as_ref().map(|s| s.age_at(now).num_seconds()),
            cache_expiry,
            last_request_time: self.limiter.last_call(),
            min_request_interval: self.limiter.min_interval().num_seconds(),
            rate_limit_wait_seconds: self.limiter.wait_remaining().num_seconds(),
            last_attempt,
            next_external_source,
            sources: self
                .sources
                .iter()
                .map(|s| SourceInfo {
                    name: s.source_name().to_string(),
                    external: s.is_external(),
                    configured: s.is_configured(),
                })
                .collect(),
            current_time: now,
        }
    }

    async fn run_cycle(&self) -> TrendSet {
        let cursor = self.cursor.load(Ordering::Acquire);

        for (index, source) in self.sources.iter().enumerate() {
            let name = source.source_name();

            if !source.is_configured() {
                self.record(name, AttemptOutcome::NotConfigured);
                continue;
            }

            // Sources before the cursor already had their turn
            let external = source.is_external();
            if external && index < cursor {
                continue;
            }
            // Apply rate limiting
            if external && !self.limiter.try_acquire() {
                self.record(name, AttemptOutcome::RateLimited);
                continue;
            }

            match self.attempt(source.as_ref()).await {
                Ok(accepted) if !accepted.is_empty() => {
                    // Success: next cycle starts from the top again
                    if external {
                        self.cursor.store(0, Ordering::Release);
                    }
                    self.record(name, AttemptOutcome::Succeeded { accepted: accepted.len() });
                    return self.trend_set(name, accepted, false);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Trend source {} failed: {}", name, e);
                    self.record(name, AttemptOutcome::Failed { reason: e.to_string() });
                }
            }

            if external {
                self.advance_cursor(index);
            }
        }

        // Curated fallback
        warn!("All trend sources failed, using curated fallback");
        let mut topics = self.fallback_topics.clone();
        topics.shuffle(&mut rand::thread_rng());
        topics.truncate(self.max_topics);
        self.trend_set(FALLBACK_SOURCE, topics, true)
    }

    async fn attempt(&self, source: &dyn TrendSource) -> Result<Vec<String>> {
        let name = source.source_name();
        debug!("Trying trend source {}", name);

        let raw = match tokio::time::timeout(self.source_timeout, source.fetch()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OrchestratorError::source_failed(
                    name,
                    format!("timed out after {}s", self.source_timeout.as_secs()),
                ))
            }
        };

        let candidates = raw.len();
        let accepted = self.filter.filter_batch(name, raw);
        if accepted.is_empty() {
            info!("Trend source {} returned {} candidates, none accepted", name, candidates);
            self.record(name, AttemptOutcome::NothingAccepted { candidates });
        }
        Ok(accepted)
    }

    fn advance_cursor(&self, failed_index: usize) {
        let next = self
            .sources
            .iter()
            .enumerate()
            .skip(failed_index + 1)
            .find(|(_, s)| s.is_external() && s.is_configured())
            .map_or(0, |(i, _)| i);
        self.cursor.store(next, Ordering::Release);
    }

    fn record(&self, source: &str, outcome: AttemptOutcome) {
        *self.last_attempt.lock().unwrap_or_else(|p| p.into_inner()) = Some(SourceAttempt {
            source: source.to_string(),
            at: self.clock.now(),
            outcome,
        });
    }

    fn trend_set(&self, source: &str, labels: Vec<String>, fallback: bool) -> TrendSet {
        let now = self.clock.now();
        TrendSet {
            topics: labels
                .into_iter()
                .map(|label| TrendTopic {
                    label,
                    source: source.to_string(),
                    fetched_at: now,
                })
                .collect(),
            fetched_at: now,
            source: source.to_string(),
            fallback,
        }
    }
}
