use crate::types::{FetchConfig, OrchestratorError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Shared HTTP client for trend sources.
///
/// A retryable status (429 or 5xx) is retried with exponential backoff up to
/// `max_retries` times inside one call. Timeouts and transport errors end the
/// call immediately.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, application/xml, text/xml"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        self.send_with_retry(url, None).await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str, bearer: Option<&str>) -> Result<T> {
        let body = self.send_with_retry(url, bearer).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_with_retry(&self, url: &str, bearer: Option<&str>) -> Result<String> {
        let parsed = Url::parse(url)?;
        let start_time = Instant::now();
        let retry_delay = Duration::from_millis(self.config.retry_delay_millis);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_delay,
            initial_interval: retry_delay,
            max_interval: retry_delay * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_seconds)),
            ..Default::default()
        };

        // Retry only retryable statuses; transport errors and timeouts fail fast
        let mut attempt = 0;
        loop {
            debug!("GET {} (attempt {})", parsed, attempt + 1);

            let response = self.request(parsed.clone(), bearer).send().await.map_err(|e| {
                if e.is_timeout() {
                    OrchestratorError::Timeout {
                        operation: format!("GET {}", parsed),
                        seconds: self.config.timeout_seconds,
                    }
                } else {
                    OrchestratorError::Http(e)
                }
            })?;

            let status = response.status();
            if status.is_success() {
                // Check size limit
                if let Some(content_length) = response.content_length() {
                    let size_mb = content_length as usize / (1024 * 1024);
                    if size_mb > self.config.max_body_size_mb {
                        return Err(OrchestratorError::General(format!(
                            "Response too large: {}MB from {}",
                            size_mb, parsed
                        )));
                    }
                }

                let body = response.text().await?;
                info!(
                    "Fetched {} ({} bytes in {}ms)",
                    parsed,
                    body.len(),
                    start_time.elapsed().as_millis()
                );
                return Ok(body);
            }

            let error = OrchestratorError::General(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));

            // Give up on client errors or once retries are spent
            if !is_retryable(status) || attempt >= self.config.max_retries {
                return Err(error);
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!("Attempt {} failed for {} ({}), retrying in {:?}", attempt + 1, parsed, status, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(error),
            }
        }
    }

    fn request(&self, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let request = self.client.get(url);
        match bearer {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_throttling_and_server_errors_retry() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_any_request() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher.fetch_text("not a url").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidUrl(_)));
    }
}
