//! HTTP client for a Nominatim-compatible `/search` endpoint.

use haikyo_core::Coordinate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{GeocodeFuture, GeocodingService};
use crate::error::GeocodeError;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

pub struct NominatimClient {
    client: Client,
    base_url: String,
}

impl NominatimClient {
    /// `base_url` is the service root, e.g. `https://nominatim.openstreetmap.org`.
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn search_once(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() || err.is_request() {
                    GeocodeError::Unavailable {
                        reason: err.to_string(),
                    }
                } else {
                    GeocodeError::Http(err)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(GeocodeError::Unavailable {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(GeocodeError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let places: Vec<NominatimPlace> =
            serde_json::from_str(&body).map_err(|e| GeocodeError::Deserialize(e.to_string()))?;

        Ok(places.into_iter().find_map(|place| {
            let lat = place.lat.trim().parse::<f64>().ok()?;
            let lon = place.lon.trim().parse::<f64>().ok()?;
            Coordinate::new(lat, lon)
        }))
    }
}

impl GeocodingService for NominatimClient {
    fn search(&self, query: String) -> GeocodeFuture<'_> {
        Box::pin(async move { self.search_once(&query).await })
    }
}
