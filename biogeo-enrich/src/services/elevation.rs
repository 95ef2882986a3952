//! Elevation service client
//!
//! Resolves elevation in meters for a coordinate through an
//! Open-Elevation-style lookup endpoint. A missing-data response is an
//! absence (`None`), not an error; transport failures are retryable through
//! the "elevation" rate-limit domain. Coordinates already resolved in this
//! run are served from a memo cache.

use crate::config::{EnrichConfig, RateLimitSettings};
use crate::error::FetchError;
use crate::services::rate_limiter::RateLimitedClient;
use crate::types::ElevationProvider;
use biogeo_common::Coordinate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("biogeo-enrich/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

/// Elevation API client with per-run memo cache.
pub struct ElevationClient {
    http_client: reqwest::Client,
    limiter: RateLimitedClient,
    base_url: String,
    cache: Mutex<HashMap<(u64, u64), Option<f64>>>,
}

impl ElevationClient {
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
            limiter: RateLimitedClient::new("elevation", settings),
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &EnrichConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.elevation_base_url,
            &config.elevation_rate,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn lookup(&self, coord: Coordinate) -> Result<Option<f64>, FetchError> {
        let url = format!(
            "{}/api/v1/lookup?locations={:.6},{:.6}",
            self.base_url, coord.latitude, coord.longitude
        );

        tracing::debug!(coordinate = %coord, "Querying elevation service");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();

        // The service answers 404 for points it has no data for
        if status == 404 {
            return Ok(None);
        }

        if status == 429 {
            return Err(FetchError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::Api(status.as_u16(), error_text));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        Ok(lookup.results.into_iter().next().and_then(|r| r.elevation))
    }
}

#[async_trait::async_trait]
impl ElevationProvider for ElevationClient {
    async fn elevation(&self, coord: Coordinate) -> Result<Option<f64>, FetchError> {
        let key = (coord.latitude.to_bits(), coord.longitude.to_bits());

        if let Some(cached) = self.cache.lock().await.get(&key) {
            tracing::debug!(coordinate = %coord, "Elevation cache hit");
            return Ok(*cached);
        }

        let result = self
            .limiter
            .call("elevation", || self.lookup(coord))
            .await?;

        if let Some(meters) = result {
            tracing::info!(coordinate = %coord, elevation_m = meters, "Resolved elevation");
        }

        self.cache.lock().await.insert(key, result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ElevationClient::from_config(&EnrichConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_lookup_response_parsing() {
        let body = r#"{"results": [{"latitude": 35.98, "longitude": -84.27, "elevation": 265.0}]}"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results[0].elevation, Some(265.0));
    }

    #[test]
    fn test_lookup_response_missing_elevation() {
        let body = r#"{"results": [{"latitude": 0.0, "longitude": 0.0, "elevation": null}]}"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results[0].elevation, None);
    }
}
