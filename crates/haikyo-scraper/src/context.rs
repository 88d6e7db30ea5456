//! Long-lived scraper resources built once from [`AppConfig`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use haikyo_core::AppConfig;
use haikyo_export::ExportOptions;
use reqwest::{Client, Url};

use crate::discovery::{discover_targets, index_targets, DiscoveredTarget, ScrapeTarget};
use crate::error::{JobAbortError, ScraperError};
use crate::extract::LocationExtractor;
use crate::fetch::{build_http_client, FetchCache};
use crate::geocode::{AddressGeocoder, GeocoderSettings, GeocodingService, NominatimClient};
use crate::job::{JobRequest, ScrapeJob};

/// Per-job tuning taken from configuration.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub base_url: String,
    pub inter_request_delay: Duration,
    pub max_linked_posts: usize,
    pub description_max_chars: usize,
    pub default_max_locations: usize,
    /// Where finished jobs write their KML file; `None` disables the file.
    pub export_dir: Option<PathBuf>,
    pub export_options: ExportOptions,
}

impl ScrapeSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            inter_request_delay: Duration::from_millis(config.inter_request_delay_ms),
            max_linked_posts: config.max_linked_posts,
            description_max_chars: config.description_max_chars,
            default_max_locations: config.default_max_locations,
            export_dir: Some(config.export_dir.clone()),
            export_options: ExportOptions {
                include_fallback: config.export_include_fallback,
                ..ExportOptions::default()
            },
        }
    }
}

/// Shared HTTP client and geocoder; each job gets its own [`FetchCache`] so
/// the seen-URL set is scoped to one scrape session.
#[derive(Clone)]
pub struct ScrapeContext {
    geocoder: Arc<AddressGeocoder>,
    client: Client,
    settings: ScrapeSettings,
}

impl ScrapeContext {
    /// Builds the HTTP client and a Nominatim-backed geocoder from config.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError`] if the base URL does not parse or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let client = build_http_client(config.fetch_timeout_secs, &config.user_agent)?;
        let service = Arc::new(NominatimClient::new(client.clone(), &config.geocoder_url));
        let geocoder_settings = GeocoderSettings {
            max_attempts: config.geocode_max_attempts,
            backoff: Duration::from_millis(config.geocode_backoff_ms),
            country_qualifier: config.country_qualifier.clone(),
        };
        Self::new(
            client,
            service,
            geocoder_settings,
            ScrapeSettings::from_config(config),
        )
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidBaseUrl`] if `settings.base_url` is not
    /// an absolute URL.
    pub fn new(
        client: Client,
        service: Arc<dyn GeocodingService>,
        geocoder_settings: GeocoderSettings,
        settings: ScrapeSettings,
    ) -> Result<Self, ScraperError> {
        Url::parse(&settings.base_url).map_err(|e| ScraperError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            geocoder: Arc::new(AddressGeocoder::new(service, geocoder_settings)),
            client,
            settings,
        })
    }

    /// Stops jobs from writing their own export file.
    #[must_use]
    pub fn without_export_dir(mut self) -> Self {
        self.settings.export_dir = None;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ScrapeSettings {
        &self.settings
    }

    /// A fresh extractor with an empty seen-URL set.
    #[must_use]
    pub fn extractor(&self) -> LocationExtractor {
        let fetcher = Arc::new(FetchCache::new(
            self.client.clone(),
            self.settings.inter_request_delay,
        ));
        LocationExtractor::new(
            fetcher,
            Arc::clone(&self.geocoder),
            self.settings.max_linked_posts,
            self.settings.description_max_chars,
        )
    }

    /// Runs discovery alone and numbers the result, so a caller can pick
    /// `selected_ids` for a later job over the same target and limit.
    ///
    /// # Errors
    ///
    /// Returns [`JobAbortError`] when the listing is unreachable or empty.
    pub async fn discover(
        &self,
        target: &ScrapeTarget,
        max_locations: Option<usize>,
    ) -> Result<Vec<DiscoveredTarget>, JobAbortError> {
        let fetcher = FetchCache::new(self.client.clone(), self.settings.inter_request_delay);
        let max_locations = max_locations
            .unwrap_or(self.settings.default_max_locations)
            .max(1);
        let urls =
            discover_targets(&fetcher, &self.settings.base_url, target, max_locations, &[]).await?;
        Ok(index_targets(urls))
    }

    #[must_use]
    pub fn job(&self, id: impl Into<String>, request: JobRequest) -> ScrapeJob {
        ScrapeJob::new(id.into(), request, self.extractor(), &self.settings)
    }
}
