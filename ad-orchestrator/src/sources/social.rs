use crate::fetcher::Fetcher;
use crate::traits::TrendSource;
use crate::types::{OrchestratorError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Trend {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    trends: Vec<Trend>,
}

// Trend APIs wrap the same list in different envelopes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrendsReply {
    Places(Vec<Place>),
    Place(Place),
    Bare(Vec<Trend>),
}

impl TrendsReply {
    fn into_names(self) -> Vec<String> {
        let trends = match self {
            TrendsReply::Places(places) => places.into_iter().flat_map(|p| p.trends).collect(),
            TrendsReply::Place(place) => place.trends,
            TrendsReply::Bare(trends) => trends,
        };
        trends
            .into_iter()
            .map(|t| t.name.trim_start_matches('#').to_string())
            .collect()
    }
}

/// Authenticated social-network trends endpoint. Skipped unless both the
/// URL and bearer token are configured.
pub struct SocialTrendsSource {
    fetcher: Arc<Fetcher>,
    url: Option<String>,
    bearer_token: Option<String>,
}

impl SocialTrendsSource {
    pub fn new(fetcher: Arc<Fetcher>, url: Option<String>, bearer_token: Option<String>) -> Self {
        Self {
            fetcher,
            url: url.filter(|u| !u.trim().is_empty()),
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl TrendSource for SocialTrendsSource {
    fn source_name(&self) -> &str {
        "social_trends"
    }

    fn is_configured(&self) -> bool {
        self.url.is_some() && self.bearer_token.is_some()
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let (Some(url), Some(token)) = (&self.url, &self.bearer_token) else {
            return Err(OrchestratorError::source_failed(self.source_name(), "not configured"));
        };

        let reply: TrendsReply = self.fetcher.fetch_json(url, Some(token)).await?;
        Ok(reply.into_names())
    }
}
