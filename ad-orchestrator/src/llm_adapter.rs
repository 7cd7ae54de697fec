//! HTTP clients for the generation services, plus offline stand-ins.

use crate::json_repair::parse_ad_content;
use crate::types::{
    AdContent, CollaboratorError, ImageGenerator, ImageParams, ImagePayload, PublishReceipt, Publisher,
    TextGenerator, TraceId,
};
use crate::utils::text::smart_truncate;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TRACE_HEADER: &str = "x-trace-id";

fn transport_error(e: reqwest::Error, timeout: Duration) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }
    } else {
        CollaboratorError::Transport(e.to_string())
    }
}

async fn ensure_success(response: Response, service: &str) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Model(format!(
        "{} returned HTTP {}: {}",
        service,
        status.as_u16(),
        smart_truncate(&body, 200)
    )))
}

/// Text generation through an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaTextGenerator {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaTextGenerator {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaTextGenerator {
    async fn generate(&self, prompt: &str, trace_id: &TraceId) -> Result<AdContent, CollaboratorError> {
        debug!("Requesting ad text from {} (model {})", self.base_url, self.model);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .header(TRACE_HEADER, trace_id.as_str())
            .timeout(self.timeout)
            .json(&json!({ "model": self.model, "prompt": prompt, "stream": false }))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let raw = ensure_success(response, "text generator")
            .await?
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        // Models wrap JSON in prose and fences; repair before giving up
        debug!("Raw model reply: {}", smart_truncate(&raw, 300));
        let content = parse_ad_content(&raw).map_err(|e| CollaboratorError::Model(e.to_string()))?;

        info!("Parsed ad text ({} features, scene {} chars)", content.features.len(), content.scene.len());
        Ok(content)
    }
}

#[derive(Debug, Deserialize)]
struct ImageReference {
    filename: Option<String>,
    url: Option<String>,
}

/// Image generation through `POST /generate`. The service either answers
/// with the image itself or with a reference to download.
pub struct HttpImageGenerator {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpImageGenerator {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn download(&self, url: &str, trace_id: &TraceId) -> Result<ImagePayload, CollaboratorError> {
        let response = self
            .client
            .get(url)
            .header(TRACE_HEADER, trace_id.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let response = ensure_success(response, "image download").await?;
        self.read_image(response).await
    }

    async fn read_image(&self, response: Response) -> Result<ImagePayload, CollaboratorError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| transport_error(e, self.timeout))?;
        if bytes.is_empty() {
            return Err(CollaboratorError::Model("image service returned an empty image".to_string()));
        }
        Ok(ImagePayload {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, params: &ImageParams, trace_id: &TraceId) -> Result<ImagePayload, CollaboratorError> {
        info!(
            "Requesting image (guidance {}, {} steps)",
            params.guidance_scale, params.num_inference_steps
        );

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .header(TRACE_HEADER, trace_id.as_str())
            .timeout(self.timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let response = ensure_success(response, "image generator").await?;

        // Direct image body
        let is_image = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("image/"));
        if is_image {
            return self.read_image(response).await;
        }

        // Otherwise a JSON reference to download
        let reference: ImageReference = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Model(format!("unexpected image reply: {}", e)))?;

        let url = match (reference.url, reference.filename) {
            (Some(url), _) if url.starts_with("http") => url,
            (_, Some(filename)) if !filename.is_empty() => format!("{}/download/{}", self.base_url, filename),
            _ => return Err(CollaboratorError::Model("image reply had no filename".to_string())),
        };
        debug!("Downloading generated image from {}", url);
        self.download(&url, trace_id).await
    }
}

/// Posts finished ads to the publishing service's `/post` endpoint.
pub struct HttpPublisher {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPublisher {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(
        &self,
        content: &AdContent,
        image_ref: &str,
        trace_id: &TraceId,
    ) -> Result<PublishReceipt, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/post", self.base_url))
            .header(TRACE_HEADER, trace_id.as_str())
            .timeout(self.timeout)
            .json(&json!({ "text": content, "image_url": image_ref }))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let receipt: PublishReceipt = ensure_success(response, "publisher")
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::Model(format!("unexpected publish reply: {}", e)))?;

        info!("Publisher answered '{}'", receipt.status);
        Ok(receipt)
    }
}

// A 1x1 transparent PNG.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Offline text generator that echoes the brief back as ad copy.
pub struct MockTextGenerator {
    response_delay_ms: u64,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self { response_delay_ms: 0 }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, prompt: &str, _trace_id: &TraceId) -> Result<AdContent, CollaboratorError> {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }

        let product = prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix("- Product: "))
            .unwrap_or("Featured product")
            .to_string();

        Ok(AdContent {
            description: format!("Meet {}, made for the way you live.", product),
            features: vec!["Thoughtful design".to_string(), "Everyday reliability".to_string()],
            scene: format!("{} on a sunlit table, soft focus background", product),
            tone: "friendly".to_string(),
            audience: vec!["everyone".to_string()],
            product,
        })
    }
}

/// Offline image generator returning a placeholder PNG.
#[derive(Default)]
pub struct MockImageGenerator;

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, _params: &ImageParams, _trace_id: &TraceId) -> Result<ImagePayload, CollaboratorError> {
        Ok(ImagePayload {
            bytes: PLACEHOLDER_PNG.to_vec(),
            content_type: "image/png".to_string(),
        })
    }
}

/// Offline publisher that accepts everything.
#[derive(Default)]
pub struct MockPublisher;

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(
        &self,
        _content: &AdContent,
        image_ref: &str,
        trace_id: &TraceId,
    ) -> Result<PublishReceipt, CollaboratorError> {
        warn!("Simulated publish of {} for trace {}", image_ref, trace_id);
        Ok(PublishReceipt {
            status: "ok".to_string(),
            message: "Simulated post".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_text_generator_picks_product_from_prompt() {
        let generator = MockTextGenerator::new();
        let content = generator
            .generate("Context:\n- Product: Desk Lamp\n- Tone: calm", &TraceId::new())
            .await
            .unwrap();
        assert_eq!(content.product, "Desk Lamp");
        assert!(!content.scene.is_empty());
    }

    #[tokio::test]
    async fn unreachable_publisher_is_a_transport_error() {
        let publisher = HttpPublisher::new(Client::new(), "http://127.0.0.1:9", Duration::from_secs(2));
        let result = publisher
            .publish(&AdContent::default(), "/download/abc", &TraceId::new())
            .await;
        assert!(matches!(
            result,
            Err(CollaboratorError::Transport(_)) | Err(CollaboratorError::Timeout { .. })
        ));
    }
}
