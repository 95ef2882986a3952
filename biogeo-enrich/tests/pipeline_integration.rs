//! End-to-end pipeline tests over stub collaborators
//!
//! Exercises the full record state machine without network access: stub
//! geocoder, elevation, and feature providers stand in for the external
//! services.

use async_trait::async_trait;
use biogeo_common::Coordinate;
use biogeo_enrich::config::EnrichConfig;
use biogeo_enrich::error::FetchError;
use biogeo_enrich::ontology::{LexicalIndex, TermEntry};
use biogeo_enrich::types::{
    BiosampleRecord, ConfidenceTier, ElevationProvider, FeatureProvider, Geocoder,
    GeometryKind, OsmFeature, RecordState,
};
use biogeo_enrich::workflow::PipelineOrchestrator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Stub collaborators
// ============================================================================

struct StubGeocoder {
    result: Option<Coordinate>,
    calls: AtomicUsize,
}

impl StubGeocoder {
    fn returning(coord: Option<Coordinate>) -> Arc<Self> {
        Arc::new(Self {
            result: coord,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, _text: &str) -> Result<Option<Coordinate>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result)
    }
}

struct FailingGeocoder;

#[async_trait]
impl Geocoder for FailingGeocoder {
    async fn geocode(&self, _text: &str) -> Result<Option<Coordinate>, FetchError> {
        Err(FetchError::Timeout)
    }
}

struct SlowGeocoder {
    delay: Duration,
    result: Option<Coordinate>,
}

#[async_trait]
impl Geocoder for SlowGeocoder {
    async fn geocode(&self, _text: &str) -> Result<Option<Coordinate>, FetchError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.result)
    }
}

struct StubElevation {
    result: Option<f64>,
}

#[async_trait]
impl ElevationProvider for StubElevation {
    async fn elevation(&self, _coord: Coordinate) -> Result<Option<f64>, FetchError> {
        Ok(self.result)
    }
}

struct StubFeatures {
    features: Vec<OsmFeature>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FeatureProvider for StubFeatures {
    async fn query_features(
        &self,
        _center: Coordinate,
        _radius_m: f64,
        _tag_keys: &[String],
    ) -> Result<Vec<OsmFeature>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.features.clone())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn coord(lat: f64, lon: f64) -> Coordinate {
    Coordinate::new(lat, lon).unwrap()
}

fn test_index() -> Arc<LexicalIndex> {
    Arc::new(LexicalIndex::from_terms([
        TermEntry {
            curie: "ENVO:00000043".into(),
            label: "wetland".into(),
            synonyms: vec![],
            obsolete: false,
        },
        TermEntry {
            curie: "ENVO:00000111".into(),
            label: "forest".into(),
            synonyms: vec![],
            obsolete: false,
        },
    ]))
}

fn wetland_feature() -> OsmFeature {
    OsmFeature {
        tag_key: "natural".into(),
        tag_value: "wetland".into(),
        geometry_kind: GeometryKind::Way,
        feature_distance_m: 120.0,
    }
}

fn orchestrator(
    config: EnrichConfig,
    geocoder: Arc<dyn Geocoder>,
    elevation: Arc<dyn ElevationProvider>,
    features: Arc<dyn FeatureProvider>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(config, geocoder, elevation, features, test_index()).unwrap()
}

fn record(id: &str, text: Option<&str>, coordinate: Option<Coordinate>) -> BiosampleRecord {
    BiosampleRecord::new(id, text.map(String::from), coordinate, None)
}

// ============================================================================
// Scenarios
// ============================================================================

/// Asserted and inferred coordinates ~40 m apart: HIGH tier, full
/// enrichment through normalization.
#[tokio::test]
async fn test_close_agreement_enriches_to_normalized() {
    // Given: a record whose location text geocodes right next to its
    // asserted coordinate
    let asserted = coord(35.9758, -84.2743);
    let inferred = coord(35.9761, -84.2745);
    let geocoder = StubGeocoder::returning(Some(inferred));
    let features = Arc::new(StubFeatures {
        features: vec![wetland_feature()],
        calls: Arc::new(AtomicUsize::new(0)),
    });
    let orchestrator = orchestrator(
        EnrichConfig::default(),
        geocoder,
        Arc::new(StubElevation { result: Some(250.0) }),
        features,
    );

    // When: the batch runs
    let report = orchestrator
        .run(vec![record("s1", Some("Oak Ridge, TN"), Some(asserted))])
        .await;

    // Then: the record reaches NORMALIZED with a HIGH-tier validation and
    // a wetland annotation
    assert_eq!(report.records.len(), 1);
    let r = &report.records[0];
    assert_eq!(r.state, RecordState::Normalized);

    let validation = r.validation.unwrap();
    assert_eq!(validation.confidence_tier, ConfidenceTier::High);
    assert!(validation.eligible_for_enrichment);
    assert!(validation.distance_km < 1.0);

    assert_eq!(r.elevation_m, Some(250.0));
    assert_eq!(r.osm_features.len(), 1);
    assert_eq!(r.envo_annotations.len(), 1);
    assert_eq!(r.envo_annotations[0].term_curie, "ENVO:00000043");
    assert_eq!(report.summary.by_confidence_tier.get("HIGH"), Some(&1));
}

/// Asserted and inferred ~65 km apart: REJECTED, enrichment skipped, and
/// the feature provider is never called.
#[tokio::test]
async fn test_large_disagreement_skips_enrichment() {
    // Given: geocoding places the record far from its asserted coordinate
    let asserted = coord(35.0, -84.0);
    let inferred = coord(35.585, -84.0);
    let feature_calls = Arc::new(AtomicUsize::new(0));
    let features = Arc::new(StubFeatures {
        features: vec![wetland_feature()],
        calls: Arc::clone(&feature_calls),
    });
    let orchestrator = orchestrator(
        EnrichConfig::default(),
        StubGeocoder::returning(Some(inferred)),
        Arc::new(StubElevation { result: None }),
        features,
    );

    // When: the batch runs
    let report = orchestrator
        .run(vec![record("s1", Some("somewhere"), Some(asserted))])
        .await;

    // Then: the record is REJECTED and terminal in ENRICHMENT_SKIPPED,
    // with no feature fetch attempted
    let r = &report.records[0];
    assert_eq!(r.state, RecordState::EnrichmentSkipped);
    let validation = r.validation.unwrap();
    assert_eq!(validation.confidence_tier, ConfidenceTier::Rejected);
    assert!(validation.distance_km > 10.0);
    assert!(r.osm_features.is_empty());
    assert!(r.envo_annotations.is_empty());
    assert_eq!(feature_calls.load(Ordering::SeqCst), 0);
}

/// No geocoding match: rejection by absence with a zero distance sentinel,
/// record still present in the report.
#[tokio::test]
async fn test_no_geocoding_match_rejects_by_absence() {
    // Given: the geocoder finds nothing for the location text
    let orchestrator = orchestrator(
        EnrichConfig::default(),
        StubGeocoder::returning(None),
        Arc::new(StubElevation { result: Some(100.0) }),
        Arc::new(StubFeatures {
            features: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );

    // When: the batch runs
    let report = orchestrator
        .run(vec![record(
            "s1",
            Some("unmappable gibberish"),
            Some(coord(35.0, -84.0)),
        )])
        .await;

    // Then: REJECTED with distance 0.0, not an error; elevation still
    // resolved before validation
    let r = &report.records[0];
    assert_eq!(r.state, RecordState::EnrichmentSkipped);
    assert!(r.inferred_coordinate.is_none());
    assert_eq!(r.elevation_m, Some(100.0));
    let validation = r.validation.unwrap();
    assert_eq!(validation.confidence_tier, ConfidenceTier::Rejected);
    assert_eq!(validation.distance_km, 0.0);
    assert!(r.failure.is_none());
}

/// A collaborator failure marks only that record FAILED; the rest of the
/// batch completes normally.
#[tokio::test]
async fn test_collaborator_failure_isolates_record() {
    // Given: a geocoder that always fails after its retries
    let asserted = coord(35.9758, -84.2743);
    let orchestrator = orchestrator(
        EnrichConfig::default(),
        Arc::new(FailingGeocoder),
        Arc::new(StubElevation { result: None }),
        Arc::new(StubFeatures {
            features: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );

    // When: a two-record batch runs, one with location text and one
    // without
    let report = orchestrator
        .run(vec![
            record("fails", Some("Oak Ridge, TN"), Some(asserted)),
            record("skips-geocoding", None, Some(asserted)),
        ])
        .await;

    // Then: the first record fails at location inference; the second,
    // which never calls the geocoder, still completes
    assert_eq!(report.records.len(), 2);
    let failed = &report.records[0];
    assert_eq!(failed.state, RecordState::Failed);
    assert_eq!(failed.failure.as_ref().unwrap().stage, "location_inference");

    let other = &report.records[1];
    assert_eq!(other.state, RecordState::EnrichmentSkipped);
    assert!(other.failure.is_none());
}

/// Every input record appears exactly once in the report, in input order.
#[tokio::test]
async fn test_report_preserves_input_order_and_multiplicity() {
    // Given: a batch larger than the worker pool, forcing interleaving
    let asserted = coord(35.9758, -84.2743);
    let inferred = coord(35.9761, -84.2745);
    let config = EnrichConfig {
        workers: 2,
        ..Default::default()
    };
    let orchestrator = orchestrator(
        config,
        StubGeocoder::returning(Some(inferred)),
        Arc::new(StubElevation { result: Some(1.0) }),
        Arc::new(StubFeatures {
            features: vec![wetland_feature()],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );
    let ids: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
    let records: Vec<BiosampleRecord> = ids
        .iter()
        .map(|id| record(id, Some("Oak Ridge, TN"), Some(asserted)))
        .collect();

    // When: the batch runs
    let report = orchestrator.run(records).await;

    // Then: output ids match input ids exactly, in order
    let out_ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(out_ids, ids.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(report
        .records
        .iter()
        .all(|r| r.state == RecordState::Normalized));
    assert_eq!(report.summary.total_records, 10);
}

/// Records unfinished at the batch deadline fail with stage "timeout";
/// the report still contains every record, with all of its fields.
#[tokio::test(start_paused = true)]
async fn test_batch_deadline_times_out_unfinished_records() {
    // Given: a geocoder slower than the batch deadline
    let asserted = coord(35.9758, -84.2743);
    let inferred = coord(35.9761, -84.2745);
    let config = EnrichConfig {
        batch_deadline_secs: 1,
        ..Default::default()
    };
    let orchestrator = orchestrator(
        config,
        Arc::new(SlowGeocoder {
            delay: Duration::from_secs(60),
            result: Some(inferred),
        }),
        Arc::new(StubElevation { result: None }),
        Arc::new(StubFeatures {
            features: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );
    let mut rec = record("s1", Some("Oak Ridge, TN"), Some(asserted));
    rec.asserted_elevation_m = Some(250.0);

    // When: the batch runs past its deadline
    let report = orchestrator
        .run(vec![rec, record("s2", Some("Oak Ridge, TN"), Some(asserted))])
        .await;

    // Then: both records are reported FAILED at stage "timeout"
    assert_eq!(report.records.len(), 2);
    for r in &report.records {
        assert_eq!(r.state, RecordState::Failed);
        assert_eq!(r.failure.as_ref().unwrap().stage, "timeout");
        // The asserted fields survive the timeout
        assert_eq!(r.asserted_coordinate, Some(asserted));
        assert_eq!(r.asserted_location_text.as_deref(), Some("Oak Ridge, TN"));
    }
    assert_eq!(report.records[0].asserted_elevation_m, Some(250.0));
    // The geocoding stage in flight at the deadline ran to completion
    assert_eq!(report.records[0].inferred_coordinate, Some(inferred));
    assert_eq!(report.summary.by_terminal_state.get("FAILED"), Some(&2));
}

/// A record still waiting for a worker permit at the deadline fails
/// immediately, also keeping its input fields.
#[tokio::test(start_paused = true)]
async fn test_batch_deadline_fails_queued_records_with_fields_intact() {
    // Given: one worker, so the second record queues behind the first
    let asserted = coord(35.9758, -84.2743);
    let config = EnrichConfig {
        workers: 1,
        batch_deadline_secs: 1,
        ..Default::default()
    };
    let orchestrator = orchestrator(
        config,
        Arc::new(SlowGeocoder {
            delay: Duration::from_secs(60),
            result: Some(coord(35.9761, -84.2745)),
        }),
        Arc::new(StubElevation { result: None }),
        Arc::new(StubFeatures {
            features: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );

    // When: the deadline fires while the second record is still queued
    let report = orchestrator
        .run(vec![
            record("running", Some("Oak Ridge, TN"), Some(asserted)),
            record("queued", Some("Knoxville, TN"), Some(asserted)),
        ])
        .await;

    // Then: the queued record fails at "timeout" without losing its input
    let queued = &report.records[1];
    assert_eq!(queued.id, "queued");
    assert_eq!(queued.state, RecordState::Failed);
    assert_eq!(queued.failure.as_ref().unwrap().stage, "timeout");
    assert_eq!(queued.asserted_coordinate, Some(asserted));
    assert_eq!(queued.asserted_location_text.as_deref(), Some("Knoxville, TN"));
    // It never reached the geocoder
    assert!(queued.inferred_coordinate.is_none());
}

/// Asserted elevation is compared against the resolved one.
#[tokio::test]
async fn test_elevation_percent_difference_recorded() {
    // Given: a record asserting 90 m where the service resolves 110 m
    let asserted = coord(35.9758, -84.2743);
    let orchestrator = orchestrator(
        EnrichConfig::default(),
        StubGeocoder::returning(Some(coord(35.9761, -84.2745))),
        Arc::new(StubElevation { result: Some(110.0) }),
        Arc::new(StubFeatures {
            features: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );
    let mut rec = record("s1", Some("Oak Ridge, TN"), Some(asserted));
    rec.asserted_elevation_m = Some(90.0);

    // When: the batch runs
    let report = orchestrator.run(vec![rec]).await;

    // Then: a 20% difference is recorded alongside the resolved elevation
    let r = &report.records[0];
    assert_eq!(r.elevation_m, Some(110.0));
    let diff = r.elevation_percent_difference.unwrap();
    assert!((diff - 20.0).abs() < 1e-9);
}

/// A record with neither location text nor coordinate passes through as
/// rejected rather than erroring.
#[tokio::test]
async fn test_empty_record_is_rejected_not_an_error() {
    let geocoder = StubGeocoder::returning(Some(coord(35.0, -84.0)));
    let orchestrator = orchestrator(
        EnrichConfig::default(),
        Arc::clone(&geocoder) as Arc<dyn Geocoder>,
        Arc::new(StubElevation { result: Some(1.0) }),
        Arc::new(StubFeatures {
            features: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    );

    let report = orchestrator.run(vec![record("s1", None, None)]).await;

    let r = &report.records[0];
    assert_eq!(r.state, RecordState::EnrichmentSkipped);
    assert_eq!(r.validation.unwrap().confidence_tier, ConfidenceTier::Rejected);
    assert!(r.failure.is_none());
    // Nothing to geocode, so the geocoder was never consulted
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
}
