//! biogeo-enrich library interface
//!
//! Geo-validation and environmental enrichment for biological sample
//! records: infers coordinates from free-text locations, resolves
//! elevations, validates asserted coordinates, fetches nearby geodata
//! features, and normalizes them to ontology terms.

pub mod config;
pub mod error;
pub mod ontology;
pub mod services;
pub mod types;
pub mod workflow;

pub use crate::config::EnrichConfig;
pub use crate::error::{FetchError, StageError};
pub use crate::types::{
    BiosampleRecord, ConfidenceTier, ElevationProvider, EnvoAnnotation, FeatureProvider,
    Geocoder, OsmFeature, RecordState, ValidationResult,
};
pub use crate::workflow::{BatchReport, PipelineOrchestrator};
