use serde::{Deserialize, Serialize};

/// Name used when no heading, meta title, or page title yields text.
pub const UNKNOWN_NAME: &str = "unknown";

/// Prefix written to `Location::description` when the page could not be fetched.
pub const FETCH_ERROR_MARKER: &str = "[fetch error] ";

/// A validated WGS84 point.
///
/// Construction goes through [`Coordinate::new`], so every value in the
/// system is finite, in range, and never the `(0, 0)` "not found" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Geographic center of Japan; the low-confidence geocoding fallback.
    pub const COUNTRY_CENTER: Coordinate = Coordinate {
        latitude: 36.2048,
        longitude: 138.2529,
    };

    /// Returns `None` for non-finite, out-of-range, or exactly `(0, 0)` input.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        if latitude == 0.0 && longitude == 0.0 {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a coordinate from a `(lon, lat)` ordered pair.
    #[must_use]
    pub fn from_lon_lat(longitude: f64, latitude: f64) -> Option<Self> {
        Self::new(latitude, longitude)
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            latitude: f64,
            longitude: f64,
        }

        let raw = Raw::deserialize(deserializer)?;
        Coordinate::new(raw.latitude, raw.longitude).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid coordinate ({}, {})",
                raw.latitude, raw.longitude
            ))
        })
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Which stage of the pipeline produced a location's coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    EmbeddedJson,
    MapEmbed,
    TableRow,
    MapUrl,
    FreeText,
    LinkedPost,
    Geocoded,
    CountryFallback,
}

impl CoordinateSource {
    /// The country-center default is a placeholder, not a real result.
    #[must_use]
    pub fn is_low_confidence(self) -> bool {
        matches!(self, CoordinateSource::CountryFallback)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinateSource::EmbeddedJson => "embedded_json",
            CoordinateSource::MapEmbed => "map_embed",
            CoordinateSource::TableRow => "table_row",
            CoordinateSource::MapUrl => "map_url",
            CoordinateSource::FreeText => "free_text",
            CoordinateSource::LinkedPost => "linked_post",
            CoordinateSource::Geocoded => "geocoded",
            CoordinateSource::CountryFallback => "country_fallback",
        }
    }
}

impl std::fmt::Display for CoordinateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub address: Option<String>,
    pub coordinate: Option<Coordinate>,
    pub coordinate_source: Option<CoordinateSource>,
    pub images: Vec<String>,
    pub description: String,
}

impl Location {
    /// An empty record for `source_url`; fields are filled in by extraction.
    #[must_use]
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: UNKNOWN_NAME.to_string(),
            source_url: source_url.into(),
            address: None,
            coordinate: None,
            coordinate_source: None,
            images: Vec::new(),
            description: String::new(),
        }
    }

    /// The degraded record returned when a page could not be retrieved.
    #[must_use]
    pub fn fetch_failed(id: impl Into<String>, source_url: impl Into<String>, reason: &str) -> Self {
        let mut location = Self::new(id, source_url);
        location.description = format!("{FETCH_ERROR_MARKER}{reason}");
        location
    }

    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        self.description.starts_with(FETCH_ERROR_MARKER)
    }

    pub fn set_coordinate(&mut self, coordinate: Coordinate, source: CoordinateSource) {
        self.coordinate = Some(coordinate);
        self.coordinate_source = Some(source);
    }

    /// True when the coordinate is present and not the country-center default.
    #[must_use]
    pub fn has_confident_coordinate(&self) -> bool {
        self.coordinate.is_some()
            && !self
                .coordinate_source
                .is_some_and(CoordinateSource::is_low_confidence)
    }
}

/// Truncates `text` to at most `max_chars` characters, ending with `...` when cut.
///
/// Counts `char`s, not bytes, so multi-byte text never splits mid-codepoint.
#[must_use]
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
