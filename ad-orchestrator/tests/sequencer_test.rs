use ad_orchestrator::llm_adapter::{MockImageGenerator, MockPublisher, MockTextGenerator};
use ad_orchestrator::{
    AdBrief, AdContent, ArtifactStatus, ArtifactStore, CollaboratorError, GenerationRequest, GenerationStage,
    ImageGenerator, ImageParams, ImagePayload, ManualClock, OrchestratorError, PipelineConfig, PublishReceipt,
    Publisher, Result, Sequencer, SequencerConfig, StoreConfig, TextGenerator, TraceId, TrendPipeline, TrendSource,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, Once};
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

struct StaticSource(&'static [&'static str]);

#[async_trait]
impl TrendSource for StaticSource {
    fn source_name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

/// Records every trace id and prompt it sees.
#[derive(Default)]
struct RecordingText {
    seen: Mutex<Vec<(TraceId, String)>>,
    delay: Option<Duration>,
}

#[async_trait]
impl TextGenerator for RecordingText {
    async fn generate(&self, prompt: &str, trace_id: &TraceId) -> std::result::Result<AdContent, CollaboratorError> {
        self.seen.lock().unwrap().push((trace_id.clone(), prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(AdContent {
            product: "Trail Runner".to_string(),
            audience: vec!["hikers".to_string()],
            tone: "upbeat".to_string(),
            description: "Light shoes for long days.".to_string(),
            features: vec!["Grippy sole".to_string()],
            scene: "Runner on a ridge at dawn".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingImage {
    seen: Mutex<Vec<(TraceId, ImageParams)>>,
    fail: bool,
}

#[async_trait]
impl ImageGenerator for RecordingImage {
    async fn generate(
        &self,
        params: &ImageParams,
        trace_id: &TraceId,
    ) -> std::result::Result<ImagePayload, CollaboratorError> {
        self.seen.lock().unwrap().push((trace_id.clone(), params.clone()));
        if self.fail {
            return Err(CollaboratorError::Model("CUDA out of memory".to_string()));
        }
        Ok(ImagePayload {
            bytes: vec![0x89, 0x50, 0x4E, 0x47],
            content_type: "image/png".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingPublisher {
    seen: Mutex<Vec<(TraceId, String)>>,
    fail: bool,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        _content: &AdContent,
        image_ref: &str,
        trace_id: &TraceId,
    ) -> std::result::Result<PublishReceipt, CollaboratorError> {
        self.seen.lock().unwrap().push((trace_id.clone(), image_ref.to_string()));
        if self.fail {
            return Err(CollaboratorError::Transport("connection refused".to_string()));
        }
        Ok(PublishReceipt {
            status: "ok".to_string(),
            message: "posted".to_string(),
        })
    }
}

fn pipeline(clock: Arc<ManualClock>) -> Arc<TrendPipeline> {
    Arc::new(
        TrendPipeline::new(
            PipelineConfig {
                min_source_interval_secs: 0,
                ..PipelineConfig::default()
            },
            clock,
        )
        .unwrap()
        .with_source(Box::new(StaticSource(&["Latte art"]))),
    )
}

fn store(clock: Arc<ManualClock>) -> Arc<ArtifactStore> {
    Arc::new(ArtifactStore::in_memory(StoreConfig::default(), clock))
}

fn request(use_trends: bool) -> GenerationRequest {
    GenerationRequest {
        brief: AdBrief {
            product: "Trail Runner".to_string(),
            audience: "hikers".to_string(),
            tone: "upbeat".to_string(),
            product_ref: "B000TEST01".to_string(),
            ..AdBrief::default()
        },
        use_trends,
    }
}

#[tokio::test]
async fn successful_run_stores_the_image_and_publishes() {
    init_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let store = store(clock.clone());
    let publisher = Arc::new(RecordingPublisher::default());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store.clone(),
        Arc::new(RecordingText::default()),
        Arc::new(RecordingImage::default()),
        publisher.clone(),
    );

    let outcome = sequencer.generate(request(false)).await.unwrap();

    assert_eq!(outcome.content.product, "Trail Runner");
    assert_eq!(outcome.download_path, format!("/download/{}", outcome.artifact_id));
    assert!(outcome.publish_status.success);
    assert!(outcome.theme.is_none());
    assert!(matches!(store.status(&outcome.artifact_id), ArtifactStatus::Available { .. }));
    assert_eq!(
        store.get(&outcome.artifact_id).await.unwrap().payload.as_ref(),
        &[0x89, 0x50, 0x4E, 0x47][..]
    );
    assert_eq!(publisher.seen.lock().unwrap()[0].1, outcome.download_path);
    assert_eq!(outcome.timings.len(), 4);
}

#[tokio::test]
async fn image_failure_stores_nothing() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = store(clock.clone());
    let publisher = Arc::new(RecordingPublisher::default());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store.clone(),
        Arc::new(RecordingText::default()),
        Arc::new(RecordingImage {
            fail: true,
            ..RecordingImage::default()
        }),
        publisher.clone(),
    );

    let err = sequencer.generate(request(false)).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::UpstreamGenerationFailed {
            stage: GenerationStage::Image,
            ..
        }
    ));
    assert!(store.is_empty());
    assert!(publisher.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn publish_failure_is_reported_not_raised() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = store(clock.clone());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store.clone(),
        Arc::new(RecordingText::default()),
        Arc::new(RecordingImage::default()),
        Arc::new(RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        }),
    );

    let outcome = sequencer.generate(request(false)).await.unwrap();
    assert_eq!(outcome.publish_status.status, "failed");
    assert!(!outcome.publish_status.success);
    assert!(outcome.publish_status.message.contains("connection refused"));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn trending_requests_boost_image_parameters() {
    let clock = Arc::new(ManualClock::starting_now());
    let text = Arc::new(RecordingText::default());
    let image = Arc::new(RecordingImage::default());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store(clock.clone()),
        text.clone(),
        image.clone(),
        Arc::new(RecordingPublisher::default()),
    );

    let outcome = sequencer.generate(request(true)).await.unwrap();
    let theme = outcome.theme.expect("trending run carries a theme");
    assert_eq!(theme.original_trend, "Latte art");

    let (_, params) = image.seen.lock().unwrap()[0].clone();
    assert_eq!(params.guidance_scale, 9.0);
    assert_eq!(params.num_inference_steps, 50);
    assert_eq!(params.hook_keywords, vec!["latte".to_string(), "art".to_string()]);
    assert!(params.scene.starts_with("Runner on a ridge at dawn. "));
    assert!(params.scene.ends_with(&theme.scene));

    let (_, prompt) = text.seen.lock().unwrap()[0].clone();
    assert!(prompt.contains(&theme.scene));
}

#[tokio::test]
async fn plain_requests_use_base_image_parameters() {
    let clock = Arc::new(ManualClock::starting_now());
    let image = Arc::new(RecordingImage::default());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store(clock.clone()),
        Arc::new(RecordingText::default()),
        image.clone(),
        Arc::new(RecordingPublisher::default()),
    );

    sequencer.generate(request(false)).await.unwrap();
    let (_, params) = image.seen.lock().unwrap()[0].clone();
    assert_eq!(params.guidance_scale, 7.5);
    assert_eq!(params.num_inference_steps, 40);
    assert!(params.hook_keywords.is_empty());
    assert_eq!(params.scene, "Runner on a ridge at dawn");
}

#[tokio::test]
async fn trace_id_reaches_every_collaborator() {
    let clock = Arc::new(ManualClock::starting_now());
    let text = Arc::new(RecordingText::default());
    let image = Arc::new(RecordingImage::default());
    let publisher = Arc::new(RecordingPublisher::default());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store(clock.clone()),
        text.clone(),
        image.clone(),
        publisher.clone(),
    );

    let trace_id = TraceId::from("req-42");
    let outcome = sequencer.generate_traced(trace_id.clone(), request(true)).await.unwrap();

    assert_eq!(outcome.trace_id, trace_id);
    assert_eq!(text.seen.lock().unwrap()[0].0, trace_id);
    assert_eq!(image.seen.lock().unwrap()[0].0, trace_id);
    assert_eq!(publisher.seen.lock().unwrap()[0].0, trace_id);
}

#[tokio::test(start_paused = true)]
async fn slow_text_generation_times_out() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = store(clock.clone());
    let image = Arc::new(RecordingImage::default());

    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store.clone(),
        Arc::new(RecordingText {
            delay: Some(Duration::from_secs(600)),
            ..RecordingText::default()
        }),
        image.clone(),
        Arc::new(RecordingPublisher::default()),
    )
    .with_config(SequencerConfig {
        text_timeout: Duration::from_secs(5),
        ..SequencerConfig::default()
    });

    let err = sequencer.generate(request(false)).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::UpstreamGenerationFailed {
            stage: GenerationStage::Text,
            ..
        }
    ));
    assert!(image.seen.lock().unwrap().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn offline_stand_ins_produce_a_complete_ad() {
    let clock = Arc::new(ManualClock::starting_now());
    let sequencer = Sequencer::new(
        pipeline(clock.clone()),
        store(clock.clone()),
        Arc::new(MockTextGenerator::new()),
        Arc::new(MockImageGenerator),
        Arc::new(MockPublisher),
    );

    let outcome = sequencer.generate(request(true)).await.unwrap();
    assert_eq!(outcome.content.product, "Trail Runner");
    assert_eq!(outcome.publish_status.status, "ok");
    assert_eq!(outcome.timings.len(), 5);
}
