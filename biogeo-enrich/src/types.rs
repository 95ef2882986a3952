//! Core Types and Trait Definitions for biogeo-enrich
//!
//! Defines the record data model, the per-record state machine, and the
//! collaborator traits the pipeline depends on:
//! - **Geocoder**: free-text place description to coordinate
//! - **ElevationProvider**: coordinate to elevation
//! - **FeatureProvider**: tagged geodata features around a coordinate
//!
//! Every collaborator returns an explicit result shape; callers never probe
//! responses for whichever field happens to exist.

use crate::error::{FetchError, StageError};
use biogeo_common::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Validation
// ============================================================================

/// Coarse classification of how much an inferred coordinate can be trusted
/// relative to the asserted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    Rejected,
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::Low => "LOW",
            ConfidenceTier::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// Outcome of comparing asserted vs. inferred coordinates.
///
/// `distance_km` is 0.0 when either coordinate is absent; the absence is the
/// reason for rejection, not the distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Great-circle distance between asserted and inferred, in km
    pub distance_km: f64,
    /// Confidence classification
    pub confidence_tier: ConfidenceTier,
    /// Whether downstream enrichment (feature fetch, normalization) runs
    pub eligible_for_enrichment: bool,
}

// ============================================================================
// Geodata features
// ============================================================================

/// Geometry kind of a geodata feature element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Node,
    Way,
    Relation,
}

/// A single tagged geodata feature near a sample location.
///
/// Features form a set keyed by (tag_key, tag_value, geometry_kind);
/// duplicates from overlapping query pages keep the minimum distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmFeature {
    /// Tag key (e.g. "natural")
    pub tag_key: String,
    /// Tag value (e.g. "wetland")
    pub tag_value: String,
    /// Element geometry kind
    pub geometry_kind: GeometryKind,
    /// Distance from the query center in meters
    pub feature_distance_m: f64,
}

impl OsmFeature {
    /// Deduplication key: identical features from overlapping pages collapse
    /// onto one entry.
    pub fn dedup_key(&self) -> (String, String, GeometryKind) {
        (
            self.tag_key.clone(),
            self.tag_value.clone(),
            self.geometry_kind,
        )
    }
}

// ============================================================================
// Ontology annotations
// ============================================================================

/// An ontology-term annotation produced from a feature's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvoAnnotation {
    /// The text that was annotated (tag value, or combined feature text)
    pub source_text: String,
    /// Term CURIE, upper-case prefix form (e.g. "ENVO:01000813")
    pub term_curie: String,
    /// Human-readable term label
    pub term_label: String,
    /// The surface form that matched
    pub match_string: String,
    /// Match start offset into `source_text` (inclusive)
    pub span_start: usize,
    /// Match end offset into `source_text` (exclusive)
    pub span_end: usize,
    /// Whether the term is marked obsolete in the ontology
    pub is_obsolete: bool,
    /// Annotation confidence (0.0-1.0)
    pub confidence: f64,
}

// ============================================================================
// Records
// ============================================================================

/// Per-record pipeline state machine.
///
/// `EnrichmentSkipped` is a normal terminal outcome for records whose
/// validation was not eligible for enrichment; `Failed` records carry a
/// `StageError` and are excluded from later stages but kept in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Pending,
    LocationInferred,
    ElevationResolved,
    Validated,
    EnrichmentSkipped,
    FeaturesFetched,
    Normalized,
    Failed,
}

impl RecordState {
    /// Terminal states end processing for the record.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::EnrichmentSkipped | RecordState::Normalized | RecordState::Failed
        )
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordState::Pending => "PENDING",
            RecordState::LocationInferred => "LOCATION_INFERRED",
            RecordState::ElevationResolved => "ELEVATION_RESOLVED",
            RecordState::Validated => "VALIDATED",
            RecordState::EnrichmentSkipped => "ENRICHMENT_SKIPPED",
            RecordState::FeaturesFetched => "FEATURES_FETCHED",
            RecordState::Normalized => "NORMALIZED",
            RecordState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A biological-sample record flowing through the pipeline.
///
/// Each stage writes exactly one field group and never rewrites another
/// stage's fields. Records are never deleted mid-pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiosampleRecord {
    /// Opaque unique identifier
    pub id: String,
    /// Self-reported location as free text
    pub asserted_location_text: Option<String>,
    /// Self-reported coordinate
    pub asserted_coordinate: Option<Coordinate>,
    /// Self-reported elevation in meters, when the input asserts one
    pub asserted_elevation_m: Option<f64>,
    /// Coordinate inferred by geocoding the location text
    pub inferred_coordinate: Option<Coordinate>,
    /// Elevation resolved for the asserted coordinate
    pub elevation_m: Option<f64>,
    /// Percent difference between asserted and resolved elevation
    pub elevation_percent_difference: Option<f64>,
    /// Validation outcome
    pub validation: Option<ValidationResult>,
    /// Geodata features near the asserted coordinate
    pub osm_features: Vec<OsmFeature>,
    /// Ontology annotations of the fetched features
    pub envo_annotations: Vec<EnvoAnnotation>,
    /// Current pipeline state
    pub state: RecordState,
    /// Failure detail when `state` is Failed
    pub failure: Option<StageError>,
}

impl BiosampleRecord {
    /// Create a fresh record in PENDING state.
    pub fn new(
        id: impl Into<String>,
        asserted_location_text: Option<String>,
        asserted_coordinate: Option<Coordinate>,
        asserted_elevation_m: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            asserted_location_text,
            asserted_coordinate,
            asserted_elevation_m,
            inferred_coordinate: None,
            elevation_m: None,
            elevation_percent_difference: None,
            validation: None,
            osm_features: Vec::new(),
            envo_annotations: Vec::new(),
            state: RecordState::Pending,
            failure: None,
        }
    }

    /// Mark the record failed at `stage`; later stages skip it.
    pub fn fail(&mut self, stage: impl Into<String>, reason: impl Into<String>) {
        self.state = RecordState::Failed;
        self.failure = Some(StageError::new(stage, reason));
    }
}

/// Raw input record shape, before validation.
///
/// Parsed with strict field checks so a malformed record (e.g. a partial
/// coordinate) fails the whole batch before processing starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRecord {
    pub id: String,
    #[serde(default)]
    pub location_text: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation_m: Option<f64>,
}

impl RawRecord {
    /// Validate and convert into a pipeline record.
    ///
    /// A coordinate must be complete or entirely absent.
    pub fn into_record(self) -> biogeo_common::Result<BiosampleRecord> {
        let coordinate = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon).map_err(|e| {
                biogeo_common::Error::InvalidInput(format!("record {}: {}", self.id, e))
            })?),
            (None, None) => None,
            _ => {
                return Err(biogeo_common::Error::InvalidInput(format!(
                    "record {}: partial coordinate (latitude and longitude must both be present)",
                    self.id
                )))
            }
        };
        Ok(BiosampleRecord::new(
            self.id,
            self.location_text,
            coordinate,
            self.elevation_m,
        ))
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Free-text place description to coordinate.
///
/// Implementations own their rate limiting; callers treat "no match" as
/// `Ok(None)`, never as an error.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, text: &str) -> Result<Option<Coordinate>, FetchError>;
}

/// Coordinate to elevation in meters. Missing data is `Ok(None)`.
#[async_trait::async_trait]
pub trait ElevationProvider: Send + Sync {
    async fn elevation(&self, coord: Coordinate) -> Result<Option<f64>, FetchError>;
}

/// Tagged geodata features within `radius_m` of `center`.
///
/// An empty result is success. Returned features are already deduplicated
/// and sorted by distance.
#[async_trait::async_trait]
pub trait FeatureProvider: Send + Sync {
    async fn query_features(
        &self,
        center: Coordinate,
        radius_m: f64,
        tag_keys: &[String],
    ) -> Result<Vec<OsmFeature>, FetchError>;
}

// ============================================================================
// Reports
// ============================================================================

/// Mutable per-tier counters keyed by tier name, used by the batch summary.
pub type TierCounts = HashMap<String, usize>;
