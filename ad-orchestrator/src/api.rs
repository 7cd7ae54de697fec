//! HTTP surface.

use crate::llm_adapter::TRACE_HEADER;
use crate::prompts::PromptCatalog;
use crate::sequencer::{GenerationOutcome, GenerationRequest, PublishStatus, Sequencer};
use crate::store::{ArtifactId, ArtifactStatus};
use crate::trace::StageTiming;
use crate::types::{AdBrief, AdContent, OrchestratorError, TraceId};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::{Response, StatusCode};
use warp::hyper::Body;
use warp::reply::{self, Reply};
use warp::{Filter, Rejection};

const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub sequencer: Arc<Sequencer>,
}

impl AppState {
    pub fn new(sequencer: Arc<Sequencer>) -> Self {
        Self { sequencer }
    }
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Every route, with rejections turned into JSON error bodies.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let generate_route = warp::path!("generate")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::header::optional::<String>(TRACE_HEADER))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(generate);

    let download_route = warp::path!("download" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(download);

    let status_route = warp::path!("status" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(status);

    let trends_route = warp::path!("trends")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(trends);

    let trends_debug_route = warp::path!("trends" / "debug")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(trends_debug);

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(with_state(state))
        .and_then(health);

    generate_route
        .or(download_route)
        .unify()
        .or(status_route)
        .unify()
        .or(trends_route)
        .unify()
        .or(trends_debug_route)
        .unify()
        .or(health_route)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::trace::request())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub product: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub product_ref: String,
    pub brand_text: Option<String>,
    pub cta_text: Option<String>,
    #[serde(default)]
    pub use_trends: bool,
    pub template: Option<String>,
}

impl From<GenerateBody> for GenerationRequest {
    fn from(body: GenerateBody) -> Self {
        GenerationRequest {
            brief: AdBrief {
                product: body.product.trim().to_string(),
                audience: body.audience,
                tone: body.tone,
                product_ref: body.product_ref,
                brand_text: body.brand_text,
                cta_text: body.cta_text,
                theme_hint: None,
                template: body.template,
            },
            use_trends: body.use_trends,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub trace_id: TraceId,
    pub ad_content: AdContent,
    pub artifact_id: ArtifactId,
    pub download_path: String,
    pub publish_status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    pub timings: Vec<StageTiming>,
}

impl From<GenerationOutcome> for GenerateResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            trace_id: outcome.trace_id,
            ad_content: outcome.content,
            artifact_id: outcome.artifact_id,
            download_path: outcome.download_path,
            publish_status: outcome.publish_status,
            trend: outcome.theme.map(|story| story.original_trend),
            timings: outcome.timings,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicView {
    pub label: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsResponse {
    pub topics: Vec<TopicView>,
    pub cache_age_seconds: i64,
    pub source: String,
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub artifacts: usize,
    pub pending_removals: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<TraceId>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    detail: String,
    trace_id: Option<TraceId>,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            error,
            detail: detail.into(),
            trace_id: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", detail)
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }

    fn with_trace(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error_code(&self) -> &'static str {
        self.error
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let (status, error) = match &err {
            OrchestratorError::UpstreamGenerationFailed { .. } => (StatusCode::BAD_GATEWAY, "upstream_generation_failed"),
            OrchestratorError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            OrchestratorError::ArtifactNotFound { .. } => (StatusCode::NOT_FOUND, "artifact_not_found"),
            OrchestratorError::ArtifactExpired { .. } => (StatusCode::NOT_FOUND, "artifact_expired"),
            OrchestratorError::Config(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        Self::new(status, error, err.to_string())
    }
}

impl Reply for ApiError {
    fn into_response(self) -> warp::reply::Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.detail);
        }
        let body = ErrorBody {
            error: self.error,
            detail: self.detail,
            trace_id: self.trace_id,
        };
        reply::with_status(reply::json(&body), self.status).into_response()
    }
}

fn incoming_trace_id(header: Option<&str>) -> TraceId {
    header
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 64 && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .map(TraceId::from)
        .unwrap_or_default()
}

fn parse_artifact_id(raw: &str) -> Result<ArtifactId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "artifact_not_found", format!("Artifact not found: {}", raw)))
}

pub async fn generate(
    state: AppState,
    trace_header: Option<String>,
    body: GenerateBody,
) -> Result<warp::reply::Response, Infallible> {
    let trace_id = incoming_trace_id(trace_header.as_deref());

    // Validate before any downstream call
    if body.product.trim().is_empty() {
        return Ok(ApiError::bad_request("product is required").with_trace(trace_id).into_response());
    }
    if let Some(template) = body.template.as_deref() {
        if !PromptCatalog::is_known(template) {
            return Ok(ApiError::bad_request(format!("unknown prompt template '{}'", template))
                .with_trace(trace_id)
                .into_response());
        }
    }

    match state.sequencer.generate_traced(trace_id.clone(), body.into()).await {
        Ok(outcome) => {
            let response = GenerateResponse::from(outcome);
            Ok(reply::with_header(reply::json(&response), TRACE_HEADER, trace_id.as_str()).into_response())
        }
        Err(e) => Ok(ApiError::from(e).with_trace(trace_id).into_response()),
    }
}

pub async fn download(artifact_id: String, state: AppState) -> Result<warp::reply::Response, Infallible> {
    let id = match parse_artifact_id(&artifact_id) {
        Ok(id) => id,
        Err(e) => return Ok(e.into_response()),
    };
    let artifact = match state.sequencer.store().get(&id).await {
        Ok(artifact) => artifact,
        Err(e) => return Ok(ApiError::from(e).into_response()),
    };
    debug!("Serving artifact {} ({} bytes)", id, artifact.payload.len());

    // Inline so browsers render the image, with a filename for saving
    let disposition = format!("inline; filename=\"{}.{}\"", id, extension_for(&artifact.content_type));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, artifact.content_type.as_str())
        .header(CONTENT_DISPOSITION, disposition)
        .body(Body::from(artifact.payload));

    Ok(match response {
        Ok(response) => response,
        Err(e) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()).into_response(),
    })
}

pub async fn status(artifact_id: String, state: AppState) -> Result<warp::reply::Response, Infallible> {
    let status = match artifact_id.parse::<ArtifactId>() {
        Ok(id) => state.sequencer.store().status(&id),
        Err(_) => ArtifactStatus::NotFound,
    };

    let (code, body) = match status {
        ArtifactStatus::Available { remaining } => (
            StatusCode::OK,
            StatusResponse {
                status: "Available",
                remaining_seconds: Some(whole_seconds_left(remaining)),
            },
        ),
        ArtifactStatus::Expired => (
            StatusCode::NOT_FOUND,
            StatusResponse {
                status: "Expired",
                remaining_seconds: None,
            },
        ),
        ArtifactStatus::NotFound => (
            StatusCode::NOT_FOUND,
            StatusResponse {
                status: "NotFound",
                remaining_seconds: None,
            },
        ),
    };
    Ok(reply::with_status(reply::json(&body), code).into_response())
}

/// Rounds up, so a live artifact never reports zero seconds left.
fn whole_seconds_left(remaining: chrono::Duration) -> i64 {
    let secs = remaining.num_seconds();
    if remaining > chrono::Duration::seconds(secs) {
        secs + 1
    } else {
        secs
    }
}

pub async fn trends(state: AppState) -> Result<warp::reply::Response, Infallible> {
    let pipeline = state.sequencer.pipeline();
    let set = pipeline.get_trends().await;

    let body = TrendsResponse {
        cache_age_seconds: pipeline.age_of(&set).num_seconds().max(0),
        topics: set
            .topics
            .into_iter()
            .map(|t| TopicView {
                label: t.label,
                source: t.source,
            })
            .collect(),
        source: set.source,
        fallback: set.fallback,
    };
    Ok(reply::json(&body).into_response())
}

pub async fn trends_debug(state: AppState) -> Result<warp::reply::Response, Infallible> {
    let debug = state.sequencer.pipeline().debug_info().await;
    Ok(reply::json(&debug).into_response())
}

pub async fn health(state: AppState) -> Result<warp::reply::Response, Infallible> {
    let store = state.sequencer.store();
    let body = HealthResponse {
        status: "healthy",
        artifacts: store.len(),
        pending_removals: store.pending_removals(),
    };
    Ok(reply::json(&body).into_response())
}

async fn handle_rejection(rejection: Rejection) -> Result<warp::reply::Response, Infallible> {
    let err = if rejection.is_not_found() {
        ApiError::not_found("no such route")
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        ApiError::bad_request(e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "invalid_request", "request body too large")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "method not allowed")
    } else {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", format!("{:?}", rejection))
    };
    Ok(err.into_response())
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_matches_taxonomy() {
        let upstream = ApiError::from(OrchestratorError::upstream(crate::types::GenerationStage::Image, "boom"));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let store = ApiError::from(OrchestratorError::StoreUnavailable("disk full".to_string()));
        assert_eq!(store.status(), StatusCode::SERVICE_UNAVAILABLE);

        let expired = ApiError::from(OrchestratorError::ArtifactExpired { id: ArtifactId::new() });
        assert_eq!(expired.status(), StatusCode::NOT_FOUND);

        let other = ApiError::from(OrchestratorError::General("??".to_string()));
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn well_formed_incoming_trace_ids_are_kept() {
        assert_eq!(incoming_trace_id(Some("abc-123")).as_str(), "abc-123");
        assert_ne!(incoming_trace_id(Some("bad id!")).as_str(), "bad id!");
        assert_eq!(incoming_trace_id(None).as_str().len(), 32);
    }

    #[test]
    fn partial_seconds_round_up() {
        assert_eq!(whole_seconds_left(chrono::Duration::milliseconds(400)), 1);
        assert_eq!(whole_seconds_left(chrono::Duration::seconds(600)), 600);
        assert_eq!(whole_seconds_left(chrono::Duration::milliseconds(1_001)), 2);
    }
}
