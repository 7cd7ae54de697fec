use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use interfaces::{
    AdBrief, AdContent, CollaboratorError, ImageGenerator, ImageParams, ImagePayload, PublishReceipt,
    Publisher, TextGenerator, TraceId,
};

use crate::store::ArtifactId;

/// A candidate topic that has passed the content filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendTopic {
    pub label: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// The cached result of one aggregation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSet {
    pub topics: Vec<TrendTopic>,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    /// True when every dynamic source failed and the curated set was served.
    pub fallback: bool,
}

impl TrendSet {
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.fetched_at)
    }

    pub fn first(&self) -> Option<&TrendTopic> {
        self.topics.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Text,
    Image,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationStage::Text => f.write_str("text"),
            GenerationStage::Image => f.write_str("image"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_millis: u64,
    pub max_body_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "AI-Advertisement-Generator/1.0 (Trends Integration)".to_string(),
            timeout_seconds: 15,
            max_retries: 2,
            retry_delay_millis: 500,
            max_body_size_mb: 5,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{stage} generation failed: {reason}")]
    UpstreamGenerationFailed { stage: GenerationStage, reason: String },

    #[error("Artifact store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Artifact not found: {id}")]
    ArtifactNotFound { id: ArtifactId },

    #[error("Artifact expired: {id}")]
    ArtifactExpired { id: ArtifactId },

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Source {source_name} failed: {reason}")]
    SourceFetchFailed { source_name: String, reason: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("General error: {0}")]
    General(String),
}

impl OrchestratorError {
    pub fn source_failed(source_name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::SourceFetchFailed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn upstream(stage: GenerationStage, reason: impl fmt::Display) -> Self {
        Self::UpstreamGenerationFailed {
            stage,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
