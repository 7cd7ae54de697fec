use crate::filter::{FilterConfig, DEFAULT_DENYLIST};
use crate::pipeline::{PipelineConfig, DEFAULT_FALLBACK_TOPICS};
use crate::sequencer::SequencerConfig;
use crate::store::StoreConfig;
use crate::types::{FetchConfig, OrchestratorError, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command line, with every option also readable from the environment.
#[derive(Debug, Parser)]
#[command(name = "ad-orchestrator", version, about = "Trend-aware ad generation service")]
pub struct Cli {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "ARTIFACT_RETENTION_SECS", default_value_t = 600)]
    pub retention_secs: u64,

    #[arg(long, env = "ARTIFACT_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "ARTIFACT_MAX_COUNT", default_value_t = 1024)]
    pub max_artifacts: usize,

    /// Spool payloads to this directory instead of memory.
    #[arg(long, env = "ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    #[arg(long, env = "TRENDS_CACHE_DURATION", default_value_t = 900)]
    pub cache_window_secs: u64,

    #[arg(long, env = "TRENDS_MIN_REQUEST_INTERVAL", default_value_t = 60)]
    pub min_source_interval_secs: u64,

    #[arg(long, env = "TRENDS_MAX_RETRIES", default_value_t = 2)]
    pub max_source_retries: u32,

    #[arg(long, env = "TRENDS_REQUEST_TIMEOUT", default_value_t = 15)]
    pub source_timeout_secs: u64,

    #[arg(long, env = "TRENDS_MAX_LENGTH", default_value_t = 150)]
    pub max_topic_length: usize,

    #[arg(long, env = "TRENDS_MIN_LENGTH", default_value_t = 3)]
    pub min_topic_length: usize,

    #[arg(long, env = "TRENDS_MAX_PER_SOURCE", default_value_t = 10)]
    pub max_topics_per_source: usize,

    /// Comma separated curated topics served when every source fails.
    #[arg(long, env = "TRENDS_FALLBACK_TOPICS", value_delimiter = ',')]
    pub fallback_topics: Option<Vec<String>>,

    /// Comma separated sensitive keywords.
    #[arg(long, env = "TRENDS_DENYLIST", value_delimiter = ',')]
    pub denylist: Option<Vec<String>>,

    #[arg(long, env = "SOCIAL_TRENDS_URL")]
    pub social_trends_url: Option<String>,

    #[arg(long, env = "TWITTER_BEARER_TOKEN", hide_env_values = true)]
    pub social_trends_token: Option<String>,

    #[arg(long, env = "LLM_SERVICE_URL", default_value = "http://llm-service:11434")]
    pub llm_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = "llama3")]
    pub llm_model: String,

    #[arg(long, env = "LLM_PROMPT_TEMPLATE", default_value = "standard")]
    pub prompt_template: String,

    #[arg(long, env = "LLM_CUSTOM_PROMPT")]
    pub custom_prompt: Option<String>,

    #[arg(long, env = "IMAGE_SERVICE_URL", default_value = "http://image-generator:5001")]
    pub image_url: String,

    #[arg(long, env = "POST_SERVICE_URL", default_value = "http://poster-service:5002")]
    pub post_url: String,

    #[arg(long, env = "TEXT_TIMEOUT_SECS", default_value_t = 120)]
    pub text_timeout_secs: u64,

    #[arg(long, env = "IMAGE_TIMEOUT_SECS", default_value_t = 300)]
    pub image_timeout_secs: u64,

    #[arg(long, env = "PUBLISH_TIMEOUT_SECS", default_value_t = 15)]
    pub publish_timeout_secs: u64,

    /// Use built-in stand-ins instead of the generation services.
    #[arg(long, env = "OFFLINE_MODE", default_value_t = false)]
    pub offline: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_artifacts: usize,
    pub artifact_dir: Option<PathBuf>,
    pub cache_window_secs: u64,
    pub min_source_interval_secs: u64,
    pub max_source_retries: u32,
    pub source_timeout_secs: u64,
    pub max_topic_length: usize,
    pub min_topic_length: usize,
    pub max_topics_per_source: usize,
    pub fallback_topics: Vec<String>,
    pub denylist: Vec<String>,
    pub social_trends_url: Option<String>,
    pub social_trends_token: Option<String>,
    pub llm_url: String,
    pub llm_model: String,
    pub prompt_template: String,
    pub custom_prompt: Option<String>,
    pub image_url: String,
    pub post_url: String,
    pub text_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub offline: bool,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            retention_secs: 600,
            sweep_interval_secs: 60,
            max_artifacts: 1024,
            artifact_dir: None,
            cache_window_secs: 900,
            min_source_interval_secs: 60,
            max_source_retries: 2,
            source_timeout_secs: 15,
            max_topic_length: 150,
            min_topic_length: 3,
            max_topics_per_source: 10,
            fallback_topics: DEFAULT_FALLBACK_TOPICS.iter().map(|s| s.to_string()).collect(),
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            social_trends_url: None,
            social_trends_token: None,
            llm_url: "http://llm-service:11434".to_string(),
            llm_model: "llama3".to_string(),
            prompt_template: "standard".to_string(),
            custom_prompt: None,
            image_url: "http://image-generator:5001".to_string(),
            post_url: "http://poster-service:5002".to_string(),
            text_timeout_secs: 120,
            image_timeout_secs: 300,
            publish_timeout_secs: 15,
            offline: false,
            log_level: "info".to_string(),
        }
    }
}

fn non_empty(values: Option<Vec<String>>) -> Option<Vec<String>> {
    values
        .map(|v| v.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect::<Vec<_>>())
        .filter(|v| !v.is_empty())
}

impl From<Cli> for ServiceConfig {
    fn from(cli: Cli) -> Self {
        let defaults = ServiceConfig::default();
        Self {
            bind: cli.bind,
            retention_secs: cli.retention_secs,
            sweep_interval_secs: cli.sweep_interval_secs,
            max_artifacts: cli.max_artifacts,
            artifact_dir: cli.artifact_dir,
            cache_window_secs: cli.cache_window_secs,
            min_source_interval_secs: cli.min_source_interval_secs,
            max_source_retries: cli.max_source_retries,
            source_timeout_secs: cli.source_timeout_secs,
            max_topic_length: cli.max_topic_length,
            min_topic_length: cli.min_topic_length,
            max_topics_per_source: cli.max_topics_per_source,
            fallback_topics: non_empty(cli.fallback_topics).unwrap_or(defaults.fallback_topics),
            denylist: non_empty(cli.denylist).unwrap_or(defaults.denylist),
            social_trends_url: cli.social_trends_url,
            social_trends_token: cli.social_trends_token,
            llm_url: cli.llm_url,
            llm_model: cli.llm_model,
            prompt_template: cli.prompt_template,
            custom_prompt: cli.custom_prompt,
            image_url: cli.image_url,
            post_url: cli.post_url,
            text_timeout_secs: cli.text_timeout_secs,
            image_timeout_secs: cli.image_timeout_secs,
            publish_timeout_secs: cli.publish_timeout_secs,
            offline: cli.offline,
            log_level: cli.log_level,
        }
    }
}

/// Upper bound for the retention, cache and rate-limit windows (30 days).
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention_secs == 0 {
            return Err(OrchestratorError::Config("retention window must be greater than zero".to_string()));
        }
        // Windows become chrono durations, which overflow on huge values.
        for (name, secs) in [
            ("retention window", self.retention_secs),
            ("cache window", self.cache_window_secs),
            ("source interval", self.min_source_interval_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(OrchestratorError::Config(format!(
                    "{} ({}s) exceeds the {}s limit",
                    name, secs, MAX_WINDOW_SECS
                )));
            }
        }
        if self.sweep_interval_secs == 0 || self.sweep_interval_secs >= self.retention_secs {
            return Err(OrchestratorError::Config(format!(
                "sweep interval ({}s) must be between 1s and the retention window ({}s)",
                self.sweep_interval_secs, self.retention_secs
            )));
        }
        if self.cache_window_secs == 0 {
            return Err(OrchestratorError::Config("cache window must be greater than zero".to_string()));
        }
        if self.max_artifacts == 0 {
            return Err(OrchestratorError::Config("artifact capacity must be greater than zero".to_string()));
        }
        if self.min_topic_length > self.max_topic_length {
            return Err(OrchestratorError::Config(format!(
                "topic length bounds are inverted ({} > {})",
                self.min_topic_length, self.max_topic_length
            )));
        }
        if self.max_topics_per_source == 0 {
            return Err(OrchestratorError::Config("topics per source must be greater than zero".to_string()));
        }
        if self.source_timeout_secs == 0 {
            return Err(OrchestratorError::Config("source timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            retention_secs: self.retention_secs,
            max_artifacts: self.max_artifacts,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout_seconds: self.source_timeout_secs,
            max_retries: self.max_source_retries,
            ..FetchConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            cache_window_secs: self.cache_window_secs,
            min_source_interval_secs: self.min_source_interval_secs,
            source_timeout_secs: self.source_timeout_secs,
            filter: FilterConfig {
                min_length: self.min_topic_length,
                max_length: self.max_topic_length,
                max_per_source: self.max_topics_per_source,
                denylist: self.denylist.clone(),
            },
            fallback_topics: self.fallback_topics.clone(),
        }
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            text_timeout: Duration::from_secs(self.text_timeout_secs),
            image_timeout: Duration::from_secs(self.image_timeout_secs),
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
            ..SequencerConfig::default()
        }
    }
}
