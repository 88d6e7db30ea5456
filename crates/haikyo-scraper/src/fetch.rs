//! Deduplicating, deny-listed, rate-limited page retrieval.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, Url};
use tokio::time::Instant;

use crate::error::{FetchError, ScraperError};

/// Substrings of `host + path` that never lead to location content.
pub const DENY_PATTERNS: [&str; 4] = ["fc2.com/signup", "secure.", "/login", "/signup"];

/// Builds the shared HTTP client used for page and geocoder requests.
///
/// # Errors
///
/// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
/// cannot be constructed (e.g., invalid TLS config).
pub fn build_http_client(timeout_secs: u64, user_agent: &str) -> Result<Client, ScraperError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// HTTP GET with per-session URL memory.
///
/// A URL is marked seen before its request is sent, so a second call for the
/// same URL (including one racing an in-flight fetch) is skipped without any
/// network traffic. The seen set only grows.
pub struct FetchCache {
    client: Client,
    seen: Mutex<HashSet<String>>,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl FetchCache {
    #[must_use]
    pub fn new(client: Client, min_interval: Duration) -> Self {
        Self {
            client,
            seen: Mutex::new(HashSet::new()),
            last_request: tokio::sync::Mutex::new(None),
            min_interval,
        }
    }

    #[must_use]
    pub fn has_seen(&self, url: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Fetches `url` and returns the body text.
    ///
    /// # Errors
    ///
    /// Every error means "no content for this URL"; none is fatal:
    /// - [`FetchError::AlreadySeen`]: requested earlier this session (no network call).
    /// - [`FetchError::Denied`]: matches [`DENY_PATTERNS`] (no network call).
    /// - [`FetchError::InvalidUrl`]: not an absolute http(s) URL.
    /// - [`FetchError::Http`]: transport failure or timeout.
    /// - [`FetchError::UnexpectedStatus`]: any non-2xx response.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_owned(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        if let Some(pattern) = denied_pattern(&parsed) {
            tracing::debug!(url, pattern, "skipping deny-listed URL");
            return Err(FetchError::Denied {
                url: url.to_owned(),
                pattern,
            });
        }

        let newly_seen = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_owned());
        if !newly_seen {
            tracing::debug!(url, "skipping already-fetched URL");
            return Err(FetchError::AlreadySeen {
                url: url.to_owned(),
            });
        }

        self.throttle().await;

        let response = self.client.get(parsed).send().await.map_err(|source| {
            tracing::warn!(url, error = %source, "page fetch failed");
            FetchError::Http {
                url: url.to_owned(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "page fetch returned non-success status");
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        response.text().await.map_err(|source| {
            tracing::warn!(url, error = %source, "failed reading page body");
            FetchError::Http {
                url: url.to_owned(),
                source,
            }
        })
    }

    /// Waits out the remainder of `min_interval` since the previous request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn denied_pattern(url: &Url) -> Option<&'static str> {
    let target = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
    DENY_PATTERNS
        .iter()
        .copied()
        .find(|pattern| target.contains(pattern))
}
