use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-request correlation token threaded through every downstream call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// What the caller asked for: the product and how to talk about it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdBrief {
    pub product: String,
    pub audience: String,
    pub tone: String,
    pub product_ref: String,
    pub brand_text: Option<String>,
    pub cta_text: Option<String>,
    /// Thematic hint folded in from a trending topic.
    pub theme_hint: Option<String>,
    /// Prompt template name; `None` uses the configured default.
    pub template: Option<String>,
}

/// Structured ad copy returned by the text generator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdContent {
    #[serde(default)]
    pub product: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub audience: Vec<String>,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "feature_list")]
    pub features: Vec<String>,
    #[serde(default)]
    pub scene: String,
}

/// Inputs for the image generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub product_name: String,
    pub features: Vec<String>,
    pub brand_text: Option<String>,
    pub cta_text: Option<String>,
    pub scene: String,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    #[serde(default)]
    pub hook_keywords: Vec<String>,
}

/// Binary output of the image generator.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub status: String,
    #[serde(default, alias = "msg")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("model error: {0}")]
    Model(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, trace_id: &TraceId) -> Result<AdContent, CollaboratorError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, params: &ImageParams, trace_id: &TraceId) -> Result<ImagePayload, CollaboratorError>;
}

/// Publishing is best effort; callers treat failures as non-fatal.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        content: &AdContent,
        image_ref: &str,
        trace_id: &TraceId,
    ) -> Result<PublishReceipt, CollaboratorError>;
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

// Models sometimes emit features as {"name": .., "value": ..} objects.
fn feature_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Feature {
        Text(String),
        Named { name: String, value: Option<String> },
    }

    let features = Option::<Vec<Feature>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(features
        .into_iter()
        .map(|feature| match feature {
            Feature::Text(text) => text,
            Feature::Named { name, value: Some(value) } => format!("{}: {}", name, value),
            Feature::Named { name, value: None } => name,
        })
        .collect())
}
