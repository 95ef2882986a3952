//! Enrichment pipeline configuration
//!
//! All thresholds are configurable defaults, not hard-coded truths: tier
//! boundaries and the annotation confidence threshold are starting points
//! pending domain calibration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retry and spacing settings for one rate-limit domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Minimum wall-clock spacing between successive calls, in ms
    pub min_interval_ms: u64,
    /// Maximum retry attempts after the first call
    pub max_retries: u32,
    /// Initial backoff delay, in ms (doubles per retry)
    pub backoff_base_ms: u64,
    /// Backoff cap, in ms
    pub backoff_cap_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_cap_ms: 30_000,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Maximum asserted-vs-inferred distance for enrichment eligibility, km
    pub max_distance_km: f64,
    /// Upper bound (exclusive) of the HIGH confidence tier, km
    pub tier_high_km: f64,
    /// Upper bound (exclusive) of the MEDIUM confidence tier, km
    pub tier_medium_km: f64,
    /// Feature search radius around the asserted coordinate, meters
    pub radius_m: f64,
    /// Tag keys requested from the geodata feature service
    pub tag_keys: Vec<String>,
    /// Minimum annotation match length, characters
    pub min_match_length: usize,
    /// Minimum annotation confidence to keep
    pub confidence_threshold: f64,
    /// Worker pool size; external call spacing, not CPU, is the limit
    pub workers: usize,
    /// Whole-batch deadline in seconds; 0 disables the deadline
    pub batch_deadline_secs: u64,
    /// Per-request HTTP timeout, seconds
    pub request_timeout_secs: u64,
    /// Server-side timeout passed to the geodata feature service, seconds
    pub overpass_timeout_secs: u64,
    /// Geocoder service base URL
    pub geocoder_base_url: String,
    /// Elevation service base URL
    pub elevation_base_url: String,
    /// Geodata feature service base URL
    pub overpass_base_url: String,
    /// Lexical index snapshot path; built-in seed lexicon when unset
    pub lexical_index_path: Option<PathBuf>,
    /// Rate limiting for the "geocoder" domain
    pub geocoder_rate: RateLimitSettings,
    /// Rate limiting for the "elevation" domain
    pub elevation_rate: RateLimitSettings,
    /// Rate limiting for the "osm" domain
    pub osm_rate: RateLimitSettings,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 10.0,
            tier_high_km: 1.0,
            tier_medium_km: 5.0,
            radius_m: 1000.0,
            tag_keys: default_tag_keys(),
            min_match_length: 3,
            confidence_threshold: 0.7,
            workers: 4,
            batch_deadline_secs: 0,
            request_timeout_secs: 30,
            overpass_timeout_secs: 180,
            geocoder_base_url: "https://nominatim.openstreetmap.org".to_string(),
            elevation_base_url: "https://api.open-elevation.com".to_string(),
            overpass_base_url: "https://overpass-api.de".to_string(),
            lexical_index_path: None,
            geocoder_rate: RateLimitSettings::default(),
            elevation_rate: RateLimitSettings::default(),
            osm_rate: RateLimitSettings::default(),
        }
    }
}

impl EnrichConfig {
    /// Batch deadline as a Duration, when configured.
    pub fn batch_deadline(&self) -> Option<Duration> {
        if self.batch_deadline_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.batch_deadline_secs))
        }
    }

    /// Reject configurations that would misbehave before any record runs.
    pub fn validate(&self) -> biogeo_common::Result<()> {
        if self.tier_high_km > self.tier_medium_km || self.tier_medium_km > self.max_distance_km {
            return Err(biogeo_common::Error::Config(format!(
                "tier thresholds must be ordered: high {} <= medium {} <= max {}",
                self.tier_high_km, self.tier_medium_km, self.max_distance_km
            )));
        }
        if self.radius_m <= 0.0 {
            return Err(biogeo_common::Error::Config(format!(
                "radius_m must be positive, got {}",
                self.radius_m
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(biogeo_common::Error::Config(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.workers == 0 {
            return Err(biogeo_common::Error::Config(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.tag_keys.is_empty() {
            return Err(biogeo_common::Error::Config(
                "tag_keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default tag key set for feature queries.
pub fn default_tag_keys() -> Vec<String> {
    [
        "natural",
        "waterway",
        "water",
        "landuse",
        "geological",
        "ecosystem",
        "wetland",
        "soil",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
