//! Overpass API client for geodata feature retrieval
//!
//! Queries tagged features within a radius of a coordinate. One Overpass QL
//! query per invocation covers every configured tag key; results are
//! deduplicated by (tag_key, tag_value, geometry_kind) keeping the minimum
//! distance, and sorted nearest first. All transport goes through the "osm"
//! rate-limit domain; an empty result is success.

use crate::config::{EnrichConfig, RateLimitSettings};
use crate::error::FetchError;
use crate::services::rate_limiter::RateLimitedClient;
use crate::types::{FeatureProvider, GeometryKind, OsmFeature};
use biogeo_common::{geodesy, Coordinate};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const USER_AGENT: &str = concat!("biogeo-enrich/", env!("CARGO_PKG_VERSION"));

/// Raw Overpass response envelope.
#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

/// One element of an Overpass response. Nodes carry lat/lon directly;
/// ways and relations carry a computed center.
#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn geometry_kind(&self) -> Option<GeometryKind> {
        match self.element_type.as_str() {
            "node" => Some(GeometryKind::Node),
            "way" => Some(GeometryKind::Way),
            "relation" => Some(GeometryKind::Relation),
            _ => None,
        }
    }

    fn coordinate(&self) -> Option<Coordinate> {
        let (lat, lon) = match (&self.center, self.lat, self.lon) {
            (Some(center), _, _) => (center.lat, center.lon),
            (None, Some(lat), Some(lon)) => (lat, lon),
            _ => return None,
        };
        Coordinate::new(lat, lon).ok()
    }
}

/// Build the Overpass QL query for all `tag_keys` around a point.
pub fn build_query(
    center: Coordinate,
    radius_m: f64,
    tag_keys: &[String],
    timeout_secs: u64,
) -> String {
    let clauses: Vec<String> = tag_keys
        .iter()
        .map(|key| {
            format!(
                "nwr[\"{}\"](around:{:.0},{:.6},{:.6});",
                key, radius_m, center.latitude, center.longitude
            )
        })
        .collect();

    format!(
        "[out:json][timeout:{}];({});out body center qt;",
        timeout_secs,
        clauses.join("")
    )
}

/// Collapse duplicate features onto one entry per (tag_key, tag_value,
/// geometry_kind), keeping the minimum distance, sorted nearest first.
pub fn dedup_features(features: Vec<OsmFeature>) -> Vec<OsmFeature> {
    let mut by_key: HashMap<(String, String, GeometryKind), OsmFeature> = HashMap::new();
    for feature in features {
        by_key
            .entry(feature.dedup_key())
            .and_modify(|existing| {
                if feature.feature_distance_m < existing.feature_distance_m {
                    existing.feature_distance_m = feature.feature_distance_m;
                }
            })
            .or_insert(feature);
    }

    let mut deduped: Vec<OsmFeature> = by_key.into_values().collect();
    deduped.sort_by(|a, b| {
        a.feature_distance_m
            .total_cmp(&b.feature_distance_m)
            .then_with(|| a.tag_key.cmp(&b.tag_key))
            .then_with(|| a.tag_value.cmp(&b.tag_value))
    });
    deduped
}

/// Overpass API client.
pub struct OverpassClient {
    http_client: reqwest::Client,
    limiter: RateLimitedClient,
    base_url: String,
    server_timeout_secs: u64,
}

impl OverpassClient {
    pub fn new(
        base_url: impl Into<String>,
        settings: &RateLimitSettings,
        request_timeout: Duration,
        server_timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            limiter: RateLimitedClient::new("osm", settings),
            base_url: base_url.into(),
            server_timeout_secs,
        })
    }

    pub fn from_config(config: &EnrichConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.overpass_base_url,
            &config.osm_rate,
            // The server may hold the request up to its own timeout
            Duration::from_secs(config.overpass_timeout_secs + config.request_timeout_secs),
            config.overpass_timeout_secs,
        )
    }

    async fn run_query(&self, query: &str) -> Result<OverpassResponse, FetchError> {
        let url = format!("{}/api/interpreter", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .form(&[("data", query)])
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

        response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }

    fn extract_features(
        &self,
        response: OverpassResponse,
        center: Coordinate,
        tag_keys: &[String],
    ) -> Vec<OsmFeature> {
        let mut features = Vec::new();

        for element in response.elements {
            let Some(geometry_kind) = element.geometry_kind() else {
                continue;
            };
            let Some(coord) = element.coordinate() else {
                continue;
            };
            let distance_m = geodesy::distance_km(center, coord) * 1000.0;

            // One element can carry several of the requested tag keys
            for key in tag_keys {
                if let Some(value) = element.tags.get(key) {
                    features.push(OsmFeature {
                        tag_key: key.clone(),
                        tag_value: value.clone(),
                        geometry_kind,
                        feature_distance_m: distance_m,
                    });
                }
            }
        }

        features
    }
}

#[async_trait::async_trait]
impl FeatureProvider for OverpassClient {
    async fn query_features(
        &self,
        center: Coordinate,
        radius_m: f64,
        tag_keys: &[String],
    ) -> Result<Vec<OsmFeature>, FetchError> {
        let query = build_query(center, radius_m, tag_keys, self.server_timeout_secs);

        tracing::debug!(
            center = %center,
            radius_m,
            tag_keys = tag_keys.len(),
            "Querying Overpass"
        );

        let response = self.limiter.call("query_features", || self.run_query(&query)).await?;
        let features = dedup_features(self.extract_features(response, center, tag_keys));

        tracing::info!(
            center = %center,
            feature_count = features.len(),
            "Overpass query complete"
        );
        Ok(features)
    }
}
