//! Request orchestration: trends, text, image, store, publish.

use crate::pipeline::TrendPipeline;
use crate::prompts::PromptCatalog;
use crate::store::{ArtifactId, ArtifactStore};
use crate::story::{self, SpicedStory};
use crate::trace::{RequestContext, Stage, StageTiming};
use crate::types::{
    AdBrief, AdContent, CollaboratorError, GenerationStage, ImageGenerator, ImageParams, OrchestratorError,
    Publisher, Result, TextGenerator, TraceId,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub text_timeout: Duration,
    pub image_timeout: Duration,
    pub publish_timeout: Duration,
    pub guidance_scale: f32,
    pub inference_steps: u32,
    pub trending_guidance_scale: f32,
    pub trending_inference_steps: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            text_timeout: Duration::from_secs(120),
            image_timeout: Duration::from_secs(300),
            publish_timeout: Duration::from_secs(15),
            guidance_scale: 7.5,
            inference_steps: 40,
            trending_guidance_scale: 9.0,
            trending_inference_steps: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub brief: AdBrief,
    pub use_trends: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStatus {
    pub status: String,
    pub success: bool,
    pub message: String,
}

impl PublishStatus {
    fn failed(reason: impl ToString) -> Self {
        Self {
            status: "failed".to_string(),
            success: false,
            message: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub trace_id: TraceId,
    pub content: AdContent,
    pub artifact_id: ArtifactId,
    pub download_path: String,
    pub publish_status: PublishStatus,
    pub theme: Option<SpicedStory>,
    pub timings: Vec<StageTiming>,
}

pub fn download_path(id: &ArtifactId) -> String {
    format!("/download/{}", id)
}

async fn bounded<T, F>(limit: Duration, call: F) -> std::result::Result<T, CollaboratorError>
where
    F: Future<Output = std::result::Result<T, CollaboratorError>>,
{
    tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
        Err(CollaboratorError::Timeout {
            after_ms: limit.as_millis() as u64,
        })
    })
}

pub struct Sequencer {
    pipeline: Arc<TrendPipeline>,
    store: Arc<ArtifactStore>,
    text: Arc<dyn TextGenerator>,
    image: Arc<dyn ImageGenerator>,
    publisher: Arc<dyn Publisher>,
    prompts: PromptCatalog,
    config: SequencerConfig,
}

impl Sequencer {
    pub fn new(
        pipeline: Arc<TrendPipeline>,
        store: Arc<ArtifactStore>,
        text: Arc<dyn TextGenerator>,
        image: Arc<dyn ImageGenerator>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            pipeline,
            store,
            text,
            image,
            publisher,
            prompts: PromptCatalog::default(),
            config: SequencerConfig::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptCatalog) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<TrendPipeline> {
        &self.pipeline
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutcome> {
        self.generate_traced(TraceId::new(), request).await
    }

    /// Dropping the returned future abandons in-flight downstream calls; an
    /// artifact already stored stays until it expires.
    pub async fn generate_traced(&self, trace_id: TraceId, request: GenerationRequest) -> Result<GenerationOutcome> {
        let span = info_span!("generate", trace_id = %trace_id);
        let ctx = RequestContext::with_trace_id(trace_id, request.brief);
        self.run(ctx, request.use_trends).instrument(span).await
    }

    async fn run(&self, mut ctx: RequestContext, use_trends: bool) -> Result<GenerationOutcome> {
        info!(
            "Generating ad for '{}' (trends: {})",
            ctx.brief.product,
            if use_trends { "on" } else { "off" }
        );
        let trace_id = ctx.trace_id().clone();

        // Pick a trending theme first so it can shape the prompt
        let theme = if use_trends {
            let story = self.trending_story(&mut ctx).await;
            ctx.brief.theme_hint = Some(story.scene.clone());
            Some(story)
        } else {
            None
        };

        // Generate ad copy
        let prompt = self.prompts.render(&ctx.brief);
        let content = ctx
            .time(
                Stage::TextGeneration,
                bounded(self.config.text_timeout, self.text.generate(&prompt, &trace_id)),
            )
            .await
            .map_err(|e| OrchestratorError::upstream(GenerationStage::Text, e))?;
        let content = with_brief_defaults(content, &ctx.brief);

        // Generate the image from the copy's scene
        let params = self.image_params(&content, &ctx.brief, theme.as_ref());
        let image = ctx
            .time(
                Stage::ImageGeneration,
                bounded(self.config.image_timeout, self.image.generate(&params, &trace_id)),
            )
            .await
            .map_err(|e| OrchestratorError::upstream(GenerationStage::Image, e))?;

        // Store before publishing so the download path is live
        let store = self.store.clone();
        let artifact_id = ctx
            .time(Stage::ArtifactStore, async move {
                store.put(image.bytes, &image.content_type).await
            })
            .await?;
        let download_path = download_path(&artifact_id);

        // Publish; a failure here is reported, not raised
        let publish_status = match ctx
            .time(
                Stage::Publish,
                bounded(
                    self.config.publish_timeout,
                    self.publisher.publish(&content, &download_path, &trace_id),
                ),
            )
            .await
        {
            Ok(receipt) => PublishStatus {
                success: receipt.status.eq_ignore_ascii_case("ok") || receipt.status.eq_ignore_ascii_case("success"),
                status: receipt.status,
                message: receipt.message,
            },
            Err(e) => {
                let failure = OrchestratorError::PublishFailed(e.to_string());
                warn!("{}", failure);
                PublishStatus::failed(failure)
            }
        };

        info!(
            "Ad ready as artifact {} in {}ms (publish: {})",
            artifact_id,
            ctx.elapsed_ms(),
            publish_status.status
        );

        Ok(GenerationOutcome {
            trace_id,
            content,
            artifact_id,
            download_path,
            publish_status,
            theme,
            timings: ctx.into_timings(),
        })
    }

    async fn trending_story(&self, ctx: &mut RequestContext) -> SpicedStory {
        let pipeline = self.pipeline.clone();
        let timed: std::result::Result<_, std::convert::Infallible> = ctx
            .time(Stage::Trends, async move { Ok(pipeline.get_trends().await) })
            .await;
        let set = timed.unwrap_or_else(|never| match never {});

        // Only the top topic is used
        let first = set.first().map(std::slice::from_ref).unwrap_or_default();
        let story = story::compose(first, self.pipeline.filter(), &mut rand::thread_rng());
        info!(
            "Using trend '{}' from {} (hooks: {})",
            story.original_trend,
            set.source,
            story.hook_keywords.join(", ")
        );
        story
    }

    fn image_params(&self, content: &AdContent, brief: &AdBrief, theme: Option<&SpicedStory>) -> ImageParams {
        let (guidance_scale, num_inference_steps) = match theme {
            Some(_) => (self.config.trending_guidance_scale, self.config.trending_inference_steps),
            None => (self.config.guidance_scale, self.config.inference_steps),
        };

        let scene = match theme {
            Some(story) if !content.scene.is_empty() => format!("{}. {}", content.scene, story.scene),
            Some(story) => story.scene.clone(),
            None => content.scene.clone(),
        };

        ImageParams {
            product_name: content.product.clone(),
            features: content.features.clone(),
            brand_text: brief.brand_text.clone(),
            cta_text: brief.cta_text.clone(),
            scene,
            guidance_scale,
            num_inference_steps,
            hook_keywords: theme.map(|s| s.hook_keywords.clone()).unwrap_or_default(),
        }
    }
}

/// Models drop keys; the brief fills the gaps.
fn with_brief_defaults(mut content: AdContent, brief: &AdBrief) -> AdContent {
    if content.product.trim().is_empty() {
        content.product = brief.product.clone();
    }
    if content.tone.trim().is_empty() {
        content.tone = brief.tone.clone();
    }
    if content.audience.is_empty() && !brief.audience.is_empty() {
        content.audience = vec![brief.audience.clone()];
    }
    if content.scene.trim().is_empty() {
        content.scene = content.description.clone();
    }
    content
}
