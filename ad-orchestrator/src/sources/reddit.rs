use crate::fetcher::Fetcher;
use crate::traits::TrendSource;
use crate::types::{OrchestratorError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const SUBREDDITS: &[&str] = &["all", "popular", "trending"];
const MAX_TITLE_CHARS: usize = 100;
const ENOUGH_TITLES: usize = 5;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
}

/// Hot post titles from a few broad subreddits.
pub struct RedditSource {
    fetcher: Arc<Fetcher>,
    base_url: String,
}

impl RedditSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self::with_base_url(fetcher, "https://www.reddit.com")
    }

    pub fn with_base_url(fetcher: Arc<Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TrendSource for RedditSource {
    fn source_name(&self) -> &str {
        "reddit"
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let mut titles = Vec::new();

        for subreddit in SUBREDDITS {
            let url = format!("{}/r/{}/hot.json?limit=10", self.base_url, subreddit);
            match self.fetcher.fetch_json::<Listing>(&url, None).await {
                Ok(listing) => titles.extend(short_titles(listing)),
                Err(e) => warn!("Subreddit r/{} failed: {}", subreddit, e),
            }
            // Stop early once we have enough to filter
            if titles.len() >= ENOUGH_TITLES {
                break;
            }
        }

        if titles.is_empty() {
            return Err(OrchestratorError::source_failed(self.source_name(), "no titles from any subreddit"));
        }

        info!("Reddit returned {} candidate topics", titles.len());
        Ok(titles)
    }
}

fn short_titles(listing: Listing) -> impl Iterator<Item = String> {
    listing
        .data
        .children
        .into_iter()
        .map(|child| child.data.title)
        .filter(|title| !title.is_empty() && title.chars().count() < MAX_TITLE_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_and_empty_titles_are_skipped() {
        let long = "x".repeat(120);
        let raw = format!(
            r#"{{"data": {{"children": [
                {{"data": {{"title": "Cat learns to skateboard"}}}},
                {{"data": {{"title": "{}"}}}},
                {{"data": {{}}}}
            ]}}}}"#,
            long
        );

        let listing: Listing = serde_json::from_str(&raw).unwrap();
        let titles: Vec<String> = short_titles(listing).collect();
        assert_eq!(titles, vec!["Cat learns to skateboard".to_string()]);
    }
}
