use crate::types::{AdBrief, TraceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Trends,
    TextGeneration,
    ImageGeneration,
    ArtifactStore,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Trends => "trends",
            Stage::TextGeneration => "text_generation",
            Stage::ImageGeneration => "image_generation",
            Stage::ArtifactStore => "artifact_store",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub succeeded: bool,
}

/// Per-request state: the immutable trace id, the caller's brief and the
/// timing of every stage run so far. Lives only as long as the request.
#[derive(Debug)]
pub struct RequestContext {
    trace_id: TraceId,
    pub brief: AdBrief,
    started: Instant,
    timings: Vec<StageTiming>,
}

impl RequestContext {
    pub fn new(brief: AdBrief) -> Self {
        Self::with_trace_id(TraceId::new(), brief)
    }

    pub fn with_trace_id(trace_id: TraceId, brief: AdBrief) -> Self {
        Self {
            trace_id,
            brief,
            started: Instant::now(),
            timings: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Runs one stage and records how long it took and whether it succeeded.
    pub async fn time<T, E, F>(&mut self, stage: Stage, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let result = work.await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!("Stage {} finished in {}ms", stage, duration_ms),
            Err(e) => warn!("Stage {} failed after {}ms: {}", stage, duration_ms, e),
        }

        self.timings.push(StageTiming {
            stage,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            succeeded: result.is_ok(),
        });
        result
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
