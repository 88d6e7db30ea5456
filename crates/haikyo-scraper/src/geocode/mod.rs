//! Address geocoding fallback.
//!
//! Used only when no coordinate is embedded in the page. Queries go out in
//! narrowing order (full address, prefecture, location name) and the first
//! hit wins. If nothing resolves, the country center is returned as a
//! low-confidence placeholder so the pipeline never fails on geocoding.

mod nominatim;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use haikyo_core::{Coordinate, CoordinateSource, UNKNOWN_NAME};
use regex::Regex;

use crate::error::GeocodeError;
use crate::retry::retry_with_backoff;

pub use nominatim::NominatimClient;

pub type GeocodeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Coordinate>, GeocodeError>> + Send + 'a>>;

/// A forward geocoder. `Ok(None)` means the service answered with no match.
pub trait GeocodingService: Send + Sync + 'static {
    fn search(&self, query: String) -> GeocodeFuture<'_>;
}

static POSTAL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*〒?\s*\d{3}-?\d{4}\s*").expect("valid regex"));
static PREFECTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(東京都|北海道|京都府|大阪府|[^\s都道府県]{2,3}県)").expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct GeocoderSettings {
    pub max_attempts: u32,
    /// Base delay; the wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
    pub country_qualifier: String,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            country_qualifier: "Japan".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(Coordinate),
    /// Nothing resolved; carries the country center.
    Fallback(Coordinate),
}

impl GeocodeOutcome {
    #[must_use]
    pub fn coordinate(self) -> Coordinate {
        match self {
            GeocodeOutcome::Resolved(c) | GeocodeOutcome::Fallback(c) => c,
        }
    }

    #[must_use]
    pub fn source(self) -> CoordinateSource {
        match self {
            GeocodeOutcome::Resolved(_) => CoordinateSource::Geocoded,
            GeocodeOutcome::Fallback(_) => CoordinateSource::CountryFallback,
        }
    }
}

/// Geocoder with retry and a process-lifetime cache keyed by exact query.
pub struct AddressGeocoder {
    service: Arc<dyn GeocodingService>,
    settings: GeocoderSettings,
    cache: Mutex<HashMap<String, Coordinate>>,
}

impl AddressGeocoder {
    #[must_use]
    pub fn new(service: Arc<dyn GeocodingService>, settings: GeocoderSettings) -> Self {
        Self {
            service,
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn cached(&self, query: &str) -> Option<Coordinate> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .copied()
    }

    /// Resolves `address` (falling back to `name`) to a coordinate.
    ///
    /// Never fails: when every query comes back empty the country center is
    /// returned as [`GeocodeOutcome::Fallback`].
    pub async fn geocode(&self, name: &str, address: Option<&str>) -> GeocodeOutcome {
        for query in self.queries(name, address) {
            if let Some(coordinate) = self.lookup(&query).await {
                return GeocodeOutcome::Resolved(coordinate);
            }
        }
        tracing::warn!(
            name,
            address = address.unwrap_or_default(),
            "geocoding exhausted; using country center fallback"
        );
        GeocodeOutcome::Fallback(Coordinate::COUNTRY_CENTER)
    }

    /// Queries in the order they are tried, without duplicates.
    fn queries(&self, name: &str, address: Option<&str>) -> Vec<String> {
        let qualifier = &self.settings.country_qualifier;
        let mut queries: Vec<String> = Vec::new();

        if let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) {
            let normalized = normalize_address(address, qualifier);
            if !normalized.is_empty() {
                queries.push(normalized);
            }
            if let Some(prefecture) = prefecture_of(address) {
                queries.push(with_qualifier(prefecture, qualifier));
            }
        }

        let name = name.trim();
        if !name.is_empty() && name != UNKNOWN_NAME {
            queries.push(with_qualifier(name, qualifier));
        }

        queries.dedup();
        queries
    }

    async fn lookup(&self, query: &str) -> Option<Coordinate> {
        if let Some(hit) = self.cached(query) {
            tracing::debug!(query, "geocode cache hit");
            return Some(hit);
        }

        let result = retry_with_backoff(self.settings.max_attempts, self.settings.backoff, || {
            self.service.search(query.to_owned())
        })
        .await;

        match result {
            Ok(Some(coordinate)) => {
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(query.to_owned(), coordinate);
                tracing::debug!(query, %coordinate, "geocoded");
                Some(coordinate)
            }
            Ok(None) => {
                tracing::debug!(query, "geocoder returned no match");
                None
            }
            Err(err) => {
                tracing::warn!(query, error = %err, "geocoding failed");
                None
            }
        }
    }
}

/// Strips phone-number suffixes and a leading postal code, collapses
/// whitespace, and appends the country qualifier when missing.
#[must_use]
pub fn normalize_address(address: &str, qualifier: &str) -> String {
    let without_phone = strip_phone_suffix(address);
    let without_postal = POSTAL_PREFIX_RE.replace(without_phone, "");
    let collapsed = without_postal.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches([',', '、', ' ', ':', '：']);
    if trimmed.is_empty() {
        return String::new();
    }
    with_qualifier(trimmed, qualifier)
}

/// Cuts `address` at `電話番号` or at a `TEL` that does not continue a word
/// (so `Hotel` survives).
fn strip_phone_suffix(address: &str) -> &str {
    let mut cut = address.find("電話番号").unwrap_or(address.len());
    // ASCII lowercasing keeps byte offsets aligned with `address`.
    let lower = address.to_ascii_lowercase();
    let tel = lower.match_indices("tel").map(|(i, _)| i).find(|&i| {
        !lower[..i]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphabetic())
    });
    if let Some(i) = tel {
        cut = cut.min(i);
    }
    &address[..cut]
}

/// The leading prefecture of a Japanese address, if present.
#[must_use]
pub fn prefecture_of(address: &str) -> Option<&str> {
    let stripped = POSTAL_PREFIX_RE.find(address).map_or(address, |m| &address[m.end()..]);
    PREFECTURE_RE
        .captures(stripped.trim_start())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn with_qualifier(text: &str, qualifier: &str) -> String {
    let lower = text.to_lowercase();
    if lower.contains(&qualifier.to_lowercase()) || text.contains("日本") {
        text.to_owned()
    } else {
        format!("{text}, {qualifier}")
    }
}
