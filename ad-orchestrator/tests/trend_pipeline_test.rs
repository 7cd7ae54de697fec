use ad_orchestrator::filter::DEFAULT_DENYLIST;
use ad_orchestrator::pipeline::FALLBACK_SOURCE;
use ad_orchestrator::{
    ContentFilter, FilterConfig, ManualClock, OrchestratorError, PipelineConfig, Result, TrendPipeline, TrendSource,
    Verdict,
};
use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

#[derive(Clone, Copy)]
enum Behaviour {
    Topics(&'static [&'static str]),
    Fail,
    Hang,
}

/// Scripted trend source that counts how often it is asked.
struct ScriptedSource {
    name: &'static str,
    behaviour: Behaviour,
    external: bool,
    configured: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(name: &'static str, behaviour: Behaviour) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                behaviour,
                external: true,
                configured: true,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn local(mut self) -> Self {
        self.external = false;
        self
    }

    fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }
}

#[async_trait]
impl TrendSource for ScriptedSource {
    fn source_name(&self) -> &str {
        self.name
    }

    fn is_external(&self) -> bool {
        self.external
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Topics(topics) => Ok(topics.iter().map(|t| t.to_string()).collect()),
            Behaviour::Fail => Err(OrchestratorError::source_failed(self.name, "HTTP 503")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

fn config(min_interval_secs: u64) -> PipelineConfig {
    PipelineConfig {
        min_source_interval_secs: min_interval_secs,
        source_timeout_secs: 1,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn first_source_with_accepted_topics_wins() {
    init_tracing();
    let (first, first_calls) = ScriptedSource::new("first", Behaviour::Topics(&["Latte art", "Board games"]));
    let (second, second_calls) = ScriptedSource::new("second", Behaviour::Topics(&["Street food"]));

    let pipeline = TrendPipeline::new(config(0), Arc::new(ManualClock::starting_now()))
        .unwrap()
        .with_source(Box::new(first))
        .with_source(Box::new(second));

    let set = pipeline.get_trends().await;
    assert_eq!(set.source, "first");
    assert!(!set.fallback);
    assert_eq!(set.topics.len(), 2);
    assert!(set.topics.iter().all(|t| t.source == "first"));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn every_source_failing_serves_the_curated_fallback() {
    init_tracing();
    let (broken, _) = ScriptedSource::new("broken", Behaviour::Fail);
    let (slow, _) = ScriptedSource::new("slow", Behaviour::Hang);
    let (empty, _) = ScriptedSource::new("empty", Behaviour::Topics(&[]));

    let pipeline = TrendPipeline::new(config(0), Arc::new(ManualClock::starting_now()))
        .unwrap()
        .with_source(Box::new(broken))
        .with_source(Box::new(slow))
        .with_source(Box::new(empty.local()));

    let set = pipeline.get_trends().await;
    assert!(set.fallback);
    assert_eq!(set.source, FALLBACK_SOURCE);
    assert!(!set.topics.is_empty());
    assert!(set.topics.len() <= FilterConfig::default().max_per_source);
    assert!(set.topics.iter().all(|t| pipeline.filter().check(&t.label).accepted().is_some()));
}

#[tokio::test]
async fn fallback_result_is_cached_for_the_window() {
    let clock = Arc::new(ManualClock::starting_now());
    let (broken, calls) = ScriptedSource::new("broken", Behaviour::Fail);
    let pipeline = TrendPipeline::new(config(0), clock.clone())
        .unwrap()
        .with_source(Box::new(broken));

    let first = pipeline.get_trends().await;
    clock.advance_secs(899);
    let second = pipeline.get_trends().await;

    assert!(first.fallback);
    assert_eq!(first.fetched_at, second.fetched_at);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance_secs(2);
    pipeline.get_trends().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_hit_makes_no_source_calls() {
    let clock = Arc::new(ManualClock::starting_now());
    let (source, calls) = ScriptedSource::new("steady", Behaviour::Topics(&["Coffee shop culture"]));
    let pipeline = TrendPipeline::new(config(0), clock.clone())
        .unwrap()
        .with_source(Box::new(source));

    let first = pipeline.get_trends().await;
    for _ in 0..5 {
        clock.advance_secs(60);
        let again = pipeline.get_trends().await;
        assert_eq!(again.topics, first.topics);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.age_of(&first).num_seconds(), 300);
}

#[tokio::test]
async fn shared_rate_limit_allows_one_external_call_per_interval() {
    let clock = Arc::new(ManualClock::starting_now());
    let (first, first_calls) = ScriptedSource::new("first", Behaviour::Fail);
    let (second, second_calls) = ScriptedSource::new("second", Behaviour::Fail);

    let pipeline = TrendPipeline::new(
        PipelineConfig {
            cache_window_secs: 1,
            ..config(60)
        },
        clock.clone(),
    )
    .unwrap()
    .with_source(Box::new(first))
    .with_source(Box::new(second));

    pipeline.get_trends().await;
    clock.advance_secs(2);
    pipeline.get_trends().await;

    let external_calls = first_calls.load(Ordering::SeqCst) + second_calls.load(Ordering::SeqCst);
    assert_eq!(external_calls, 1);

    let debug = pipeline.debug_info().await;
    assert_eq!(debug.min_request_interval, 60);
    assert_eq!(debug.rate_limit_wait_seconds, 58);
}

#[tokio::test]
async fn failed_source_moves_the_cursor_to_the_next_external_source() {
    let clock = Arc::new(ManualClock::starting_now());
    let (first, first_calls) = ScriptedSource::new("first", Behaviour::Fail);
    let (second, second_calls) = ScriptedSource::new("second", Behaviour::Topics(&["Hiking trails"]));

    let pipeline = TrendPipeline::new(
        PipelineConfig {
            cache_window_secs: 1,
            ..config(60)
        },
        clock.clone(),
    )
    .unwrap()
    .with_source(Box::new(first))
    .with_source(Box::new(second));

    let initial = pipeline.get_trends().await;
    assert!(initial.fallback);
    assert_eq!(
        pipeline.debug_info().await.next_external_source.as_deref(),
        Some("second")
    );

    clock.advance_secs(61);
    let next = pipeline.get_trends().await;
    assert_eq!(next.source, "second");
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);

    // A success resets the cursor to the head of the list.
    assert_eq!(
        pipeline.debug_info().await.next_external_source.as_deref(),
        Some("first")
    );
}

#[tokio::test]
async fn cursor_skips_unconfigured_sources_and_wraps_to_the_head() {
    let clock = Arc::new(ManualClock::starting_now());
    let (google, google_calls) = ScriptedSource::new("google", Behaviour::Fail);
    let (reddit, reddit_calls) = ScriptedSource::new("reddit", Behaviour::Fail);
    let (social, social_calls) = ScriptedSource::new("social", Behaviour::Topics(&["Street art"]));
    let (seasonal, _) = ScriptedSource::new("seasonal", Behaviour::Topics(&["Pumpkin spice treats"]));

    let pipeline = TrendPipeline::new(
        PipelineConfig {
            cache_window_secs: 1,
            ..config(60)
        },
        clock.clone(),
    )
    .unwrap()
    .with_source(Box::new(google))
    .with_source(Box::new(reddit))
    .with_source(Box::new(social.unconfigured()))
    .with_source(Box::new(seasonal.local()));

    for _ in 0..10 {
        let set = pipeline.get_trends().await;
        assert_eq!(set.source, "seasonal");
        clock.advance_secs(61);
    }

    // External sources take turns, one per interval.
    assert_eq!(google_calls.load(Ordering::SeqCst), 5);
    assert_eq!(reddit_calls.load(Ordering::SeqCst), 5);
    assert_eq!(social_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        pipeline.debug_info().await.next_external_source.as_deref(),
        Some("google")
    );
}

#[tokio::test]
async fn unconfigured_sources_are_skipped_without_a_rate_limit_slot() {
    let (missing, missing_calls) = ScriptedSource::new("missing", Behaviour::Topics(&["Street art"]));
    let (present, present_calls) = ScriptedSource::new("present", Behaviour::Topics(&["Garden parties"]));

    let pipeline = TrendPipeline::new(config(60), Arc::new(ManualClock::starting_now()))
        .unwrap()
        .with_source(Box::new(missing.unconfigured()))
        .with_source(Box::new(present));

    let set = pipeline.get_trends().await;
    assert_eq!(set.source, "present");
    assert_eq!(missing_calls.load(Ordering::SeqCst), 0);
    assert_eq!(present_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn local_sources_ignore_the_rate_limit() {
    let (external, _) = ScriptedSource::new("external", Behaviour::Fail);
    let (seasonal, seasonal_calls) = ScriptedSource::new("seasonal", Behaviour::Topics(&["Pumpkin spice treats"]));

    let pipeline = TrendPipeline::new(config(60), Arc::new(ManualClock::starting_now()))
        .unwrap()
        .with_source(Box::new(external))
        .with_source(Box::new(seasonal.local()));

    let set = pipeline.get_trends().await;
    assert_eq!(set.source, "seasonal");
    assert!(!set.fallback);
    assert_eq!(seasonal_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_fetch_cycle() {
    let (source, calls) = ScriptedSource::new("popular", Behaviour::Topics(&["Music festivals"]));
    let pipeline = Arc::new(
        TrendPipeline::new(config(0), Arc::new(ManualClock::starting_now()))
            .unwrap()
            .with_source(Box::new(source)),
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.get_trends().await })
        })
        .collect();

    for task in tasks {
        let set = task.await.unwrap();
        assert_eq!(set.source, "popular");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sensitive_and_newsy_candidates_never_reach_the_cache() {
    let (source, _) = ScriptedSource::new(
        "mixed",
        Behaviour::Topics(&[
            "Breaking: shooting downtown",
            "Election results tonight",
            "Cozy knitting patterns",
            "Storm kills 4 in county",
        ]),
    );
    let pipeline = TrendPipeline::new(config(0), Arc::new(ManualClock::starting_now()))
        .unwrap()
        .with_source(Box::new(source));

    let set = pipeline.get_trends().await;
    let labels: Vec<_> = set.topics.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["Cozy knitting patterns"]);
}

proptest! {
    #[test]
    fn accepted_topics_are_clean_and_bounded(candidate in "\\PC{0,200}") {
        let config = FilterConfig::default();
        let filter = ContentFilter::new(&config).unwrap();

        if let Verdict::Accepted(clean) = filter.check(&candidate) {
            prop_assert!(!clean.is_empty());
            prop_assert!(clean.chars().count() <= config.max_length);
            prop_assert!(!filter.is_sensitive(&clean));
            prop_assert_eq!(clean.trim(), clean.as_str());
            prop_assert!(!clean.contains("  "));
        }
    }

    #[test]
    fn denylisted_keywords_are_always_rejected(
        index in 0..DEFAULT_DENYLIST.len(),
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
    ) {
        let filter = ContentFilter::new(&FilterConfig::default()).unwrap();
        let candidate = format!("{} {} {}", prefix, DEFAULT_DENYLIST[index], suffix);
        prop_assert!(filter.check(&candidate).accepted().is_none());
    }
}
