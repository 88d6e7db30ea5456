use thiserror::Error;

/// Failures constructing the scraper's shared resources.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Why a page fetch produced no content.
///
/// None of these abort a job; the caller degrades the one URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("already requested this session: {url}")]
    AlreadySeen { url: String },

    #[error("URL matches deny-list pattern \"{pattern}\": {url}")]
    Denied { url: String, pattern: &'static str },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl FetchError {
    /// Skips are expected during traversal and are logged at `debug`, not `warn`.
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, FetchError::AlreadySeen { .. } | FetchError::Denied { .. })
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("geocoding service rejected the query with HTTP {status}")]
    Rejected { status: u16 },

    #[error("HTTP error calling geocoding service: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode geocoding response: {0}")]
    Deserialize(String),
}

/// Errors that stop a job before its per-URL loop starts.
#[derive(Debug, Error)]
pub enum JobAbortError {
    #[error("target discovery failed for {url}: {reason}")]
    Discovery { url: String, reason: String },

    #[error("no location links found at {url}")]
    NoTargets { url: String },
}

#[derive(Debug, Error)]
#[error("job {running_job_id} is still running")]
pub struct JobConflict {
    pub running_job_id: String,
}
