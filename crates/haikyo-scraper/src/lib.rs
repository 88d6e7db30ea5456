//! haikyo.info location scraper.
//!
//! Fetches detail pages, resolves each to a coordinate through an ordered
//! strategy chain with a geocoding fallback, and runs whole scrapes as
//! background jobs with pollable progress.

pub mod context;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod geocode;
pub mod identity;
pub mod job;
pub mod resolver;
mod retry;

pub use context::{ScrapeContext, ScrapeSettings};
pub use discovery::{discover_targets, index_targets, search_url, DiscoveredTarget, ScrapeTarget};
pub use error::{FetchError, GeocodeError, JobAbortError, JobConflict, ScraperError};
pub use extract::{LocationExtractor, PageDetails};
pub use fetch::{build_http_client, FetchCache, DENY_PATTERNS};
pub use geocode::{
    AddressGeocoder, GeocodeOutcome, GeocoderSettings, GeocodingService, NominatimClient,
};
pub use identity::location_id;
pub use job::{
    JobHandle, JobMonitor, JobRegistry, JobReport, JobRequest, JobStatus, NullProgress,
    ProgressBoard, ProgressSink, ProgressSnapshot, ScrapeJob,
};
pub use resolver::{CoordinateResolver, Resolution};
