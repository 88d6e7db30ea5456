//! Renders finished [`Location`] lists into geospatial documents.
//!
//! Everything here is a pure function of its input: no I/O, no network.

pub mod error;
pub mod json;
pub mod kml;

use std::str::FromStr;

use haikyo_core::Location;

pub use error::ExportError;
pub use json::to_json;
pub use kml::to_kml;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Kml,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Kml => "application/vnd.google-earth.kml+xml",
            ExportFormat::Json => "application/json",
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Kml => "kml",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kml" => Ok(ExportFormat::Kml),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Write country-center fallback coordinates instead of dropping them.
    pub include_fallback: bool,
    pub document_name: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_fallback: false,
            document_name: "Haikyo Locations".to_string(),
        }
    }
}

/// Whether `location` produces a placemark under `options`.
#[must_use]
pub fn is_exportable(location: &Location, options: &ExportOptions) -> bool {
    match (location.coordinate, location.coordinate_source) {
        (None, _) => false,
        (Some(_), Some(source)) if source.is_low_confidence() => options.include_fallback,
        (Some(_), _) => true,
    }
}

/// Renders `locations` in the requested format.
///
/// # Errors
///
/// Returns [`ExportError`] if the underlying writer fails.
pub fn render(
    format: ExportFormat,
    locations: &[Location],
    options: &ExportOptions,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Kml => to_kml(locations, options),
        ExportFormat::Json => to_json(locations, options),
    }
}
