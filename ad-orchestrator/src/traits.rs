use crate::types::Result;
use async_trait::async_trait;

/// One external (or local) supplier of candidate trend topics.
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Human-readable name used for attribution and logs.
    fn source_name(&self) -> &str;

    /// Sources that touch the network share the pipeline's rate limiter.
    fn is_external(&self) -> bool {
        true
    }

    /// Unconfigured sources are skipped without using a rate-limit slot.
    fn is_configured(&self) -> bool {
        true
    }

    /// Fetch raw, unfiltered candidates in the source's own ranking order.
    async fn fetch(&self) -> Result<Vec<String>>;
}
