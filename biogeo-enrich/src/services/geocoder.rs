//! Nominatim geocoder client
//!
//! Turns a free-text place description into at most one candidate
//! coordinate. Nominatim publishes a strict 1 request/second limit and
//! requires an identifying user agent; all calls go through the "geocoder"
//! rate-limit domain. Repeated place names within one run are served from a
//! memo cache without consuming a call slot.

use crate::config::{EnrichConfig, RateLimitSettings};
use crate::error::FetchError;
use crate::services::rate_limiter::RateLimitedClient;
use crate::types::Geocoder;
use biogeo_common::Coordinate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("biogeo-enrich/", env!("CARGO_PKG_VERSION"));

/// One entry of a Nominatim search response.
///
/// Nominatim serializes coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim API client with per-run memo cache.
pub struct NominatimClient {
    http_client: reqwest::Client,
    limiter: RateLimitedClient,
    base_url: String,
    cache: Mutex<HashMap<String, Option<Coordinate>>>,
}

impl NominatimClient {
    pub fn new(
        base_url: impl Into<String>,
        settings: &RateLimitSettings,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            limiter: RateLimitedClient::new("geocoder", settings),
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &EnrichConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.geocoder_base_url,
            &config.geocoder_rate,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn search(&self, text: &str) -> Result<Option<Coordinate>, FetchError> {
        tracing::debug!(query = %text, "Querying geocoder");

        let response = self
            .http_client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", text), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();

        if status == 429 {
            return Err(FetchError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::Api(status.as_u16(), error_text));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude: f64 = place
            .lat
            .parse()
            .map_err(|_| FetchError::Parse(format!("non-numeric latitude: {}", place.lat)))?;
        let longitude: f64 = place
            .lon
            .parse()
            .map_err(|_| FetchError::Parse(format!("non-numeric longitude: {}", place.lon)))?;

        let coord = Coordinate::new(latitude, longitude)
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        tracing::info!(query = %text, coordinate = %coord, "Geocoded location");
        Ok(Some(coord))
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimClient {
    /// Infer a coordinate for `text`. No match is `Ok(None)`, not an error;
    /// empty or whitespace input short-circuits without a call.
    async fn geocode(&self, text: &str) -> Result<Option<Coordinate>, FetchError> {
        let query = text.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.cache.lock().await.get(query) {
            tracing::debug!(query, "Geocoder cache hit");
            return Ok(*cached);
        }

        let result = self.limiter.call("geocode", || self.search(query)).await?;

        self.cache
            .lock()
            .await
            .insert(query.to_string(), result);
        Ok(result)
    }
}
