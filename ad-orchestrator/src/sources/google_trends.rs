use crate::fetcher::Fetcher;
use crate::traits::TrendSource;
use crate::types::{OrchestratorError, Result};
use async_trait::async_trait;
use feed_rs::parser;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_FEEDS: &[&str] = &[
    "https://trends.google.com/trends/trendingsearches/daily/rss?geo=US",
    "https://trends.google.com/trends/hottrends/atom/feed?pn=p1",
];

/// Daily trending searches from the public RSS/Atom feeds.
pub struct GoogleTrendsSource {
    fetcher: Arc<Fetcher>,
    feed_urls: Vec<String>,
}

impl GoogleTrendsSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self::with_feeds(fetcher, DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_feeds(fetcher: Arc<Fetcher>, feed_urls: Vec<String>) -> Self {
        Self { fetcher, feed_urls }
    }
}

#[async_trait]
impl TrendSource for GoogleTrendsSource {
    fn source_name(&self) -> &str {
        "google_trends_rss"
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let mut last_error = None;

        // First feed with entries wins
        for url in &self.feed_urls {
            let titles = match self.fetcher.fetch_text(url).await {
                Ok(content) => parse_feed_titles(&content),
                Err(e) => Err(e),
            };

            match titles {
                Ok(titles) if !titles.is_empty() => {
                    info!("Trends feed {} returned {} titles", url, titles.len());
                    return Ok(titles);
                }
                Ok(_) => warn!("Trends feed {} had no entries", url),
                Err(e) => {
                    warn!("Trends feed {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OrchestratorError::source_failed(self.source_name(), "no feed returned any entries")
        }))
    }
}

/// Entry titles of an RSS or Atom document, in feed order.
pub fn parse_feed_titles(content: &str) -> Result<Vec<String>> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| OrchestratorError::Parse(format!("Failed to parse trends feed: {}", e)))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| entry.title.map(|t| t.content.trim().to_string()))
        .filter(|title| !title.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_come_back_in_feed_order() {
        let rss = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
              <title>Daily Search Trends</title>
              <item><title>Pumpkin spice latte</title></item>
              <item><title> Autumn hiking trails </title></item>
              <item><title></title></item>
            </channel></rss>"#;

        let titles = parse_feed_titles(rss).unwrap();
        assert_eq!(titles, vec!["Pumpkin spice latte".to_string(), "Autumn hiking trails".to_string()]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_feed_titles("not xml at all"), Err(OrchestratorError::Parse(_))));
    }
}
