use ad_orchestrator::llm_adapter::{
    HttpImageGenerator, HttpPublisher, MockImageGenerator, MockPublisher, MockTextGenerator, OllamaTextGenerator,
};
use ad_orchestrator::prompts::PromptCatalog;
use ad_orchestrator::sources::{GoogleTrendsSource, RedditSource, SeasonalSource, SocialTrendsSource};
use ad_orchestrator::store::{BlobStorage, DirectoryBlobs, MemoryBlobs};
use ad_orchestrator::{
    routes, AppState, ArtifactStore, Cli, Clock, Fetcher, ImageGenerator, Publisher, Reclaimer, Sequencer,
    ServiceConfig, SystemClock, TextGenerator, TrendPipeline,
};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from(Cli::parse());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;
    info!("Starting ad orchestrator on {}", config.bind);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Trend sources in priority order
    let fetcher = Arc::new(Fetcher::new(config.fetch_config())?);
    let pipeline = TrendPipeline::new(config.pipeline_config(), clock.clone())?
        .with_source(Box::new(GoogleTrendsSource::new(fetcher.clone())))
        .with_source(Box::new(RedditSource::new(fetcher.clone())))
        .with_source(Box::new(SocialTrendsSource::new(
            fetcher.clone(),
            config.social_trends_url.clone(),
            config.social_trends_token.clone(),
        )))
        .with_source(Box::new(SeasonalSource::new(clock.clone())));

    // Artifact store and its single reclamation task
    let blobs: Arc<dyn BlobStorage> = match &config.artifact_dir {
        Some(dir) => Arc::new(
            DirectoryBlobs::open(dir)
                .await
                .with_context(|| format!("cannot use artifact directory {}", dir.display()))?,
        ),
        None => Arc::new(MemoryBlobs::new()),
    };
    let store = Arc::new(ArtifactStore::new(config.store_config(), blobs, clock.clone()));
    let reclaimer = Reclaimer::spawn(store.clone(), config.sweep_interval())?;

    // Generation services
    let (text, image, publisher): (Arc<dyn TextGenerator>, Arc<dyn ImageGenerator>, Arc<dyn Publisher>) =
        if config.offline {
            warn!("Offline mode: generation services are simulated");
            (
                Arc::new(MockTextGenerator::new()),
                Arc::new(MockImageGenerator),
                Arc::new(MockPublisher),
            )
        } else {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?;
            (
                Arc::new(OllamaTextGenerator::new(
                    client.clone(),
                    &config.llm_url,
                    &config.llm_model,
                    Duration::from_secs(config.text_timeout_secs),
                )),
                Arc::new(HttpImageGenerator::new(
                    client.clone(),
                    &config.image_url,
                    Duration::from_secs(config.image_timeout_secs),
                )),
                Arc::new(HttpPublisher::new(
                    client,
                    &config.post_url,
                    Duration::from_secs(config.publish_timeout_secs),
                )),
            )
        };

    let sequencer = Sequencer::new(Arc::new(pipeline), store.clone(), text, image, publisher)
        .with_prompts(PromptCatalog::new(&config.prompt_template, config.custom_prompt.clone()))
        .with_config(config.sequencer_config());

    let routes = routes(AppState::new(Arc::new(sequencer)));
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.bind, shutdown_signal())
        .with_context(|| format!("cannot bind {}", config.bind))?;

    info!("Listening on {}", addr);
    server.await;

    // Stop accepting artifacts, then join the reclaimer
    info!("Server stopped, shutting down reclaimer");
    store.close();
    reclaimer.shutdown().await;
    info!("Ad orchestrator finished");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
