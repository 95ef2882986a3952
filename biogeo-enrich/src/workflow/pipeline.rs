//! Pipeline orchestrator: drives each record through the enrichment stages
//!
//! Stage order per record: location inference, elevation resolution,
//! coordinate validation, feature fetch, ontology normalization. Records
//! advance independently through a bounded worker pool; one record's failure
//! never aborts the batch, and every input record appears in the report
//! exactly once, in input order.

use crate::config::EnrichConfig;
use crate::ontology::{EnvoNormalizer, LexicalIndex};
use crate::services::validator::{self, ValidatorThresholds};
use crate::services::{ElevationClient, NominatimClient, OverpassClient};
use crate::types::{
    BiosampleRecord, ElevationProvider, FeatureProvider, Geocoder, RecordState,
};
use crate::workflow::statistics::BatchSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one batch run.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    /// Run identifier, fresh per invocation
    pub run_id: Uuid,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the run
    pub finished_at: DateTime<Utc>,
    /// Every input record, in input order, each in a terminal state
    pub records: Vec<BiosampleRecord>,
    /// Aggregate counters and threshold echo
    pub summary: BatchSummary,
}

/// Batch orchestrator over abstract collaborators.
pub struct PipelineOrchestrator {
    config: EnrichConfig,
    thresholds: ValidatorThresholds,
    geocoder: Arc<dyn Geocoder>,
    elevation: Arc<dyn ElevationProvider>,
    features: Arc<dyn FeatureProvider>,
    index: Arc<LexicalIndex>,
}

impl PipelineOrchestrator {
    /// Build an orchestrator over explicit collaborators. The configuration
    /// is validated up front; a bad configuration never starts a batch.
    pub fn new(
        config: EnrichConfig,
        geocoder: Arc<dyn Geocoder>,
        elevation: Arc<dyn ElevationProvider>,
        features: Arc<dyn FeatureProvider>,
        index: Arc<LexicalIndex>,
    ) -> biogeo_common::Result<Self> {
        config.validate()?;
        Ok(Self {
            thresholds: ValidatorThresholds::from(&config),
            config,
            geocoder,
            elevation,
            features,
            index,
        })
    }

    /// Build an orchestrator wired to the real external services.
    pub fn from_config(config: EnrichConfig) -> biogeo_common::Result<Self> {
        let to_config_err =
            |e: crate::error::FetchError| biogeo_common::Error::Config(format!("http client: {}", e));

        let geocoder = NominatimClient::from_config(&config).map_err(to_config_err)?;
        let elevation = ElevationClient::from_config(&config).map_err(to_config_err)?;
        let features = OverpassClient::from_config(&config).map_err(to_config_err)?;
        let index = crate::ontology::resolve_index(config.lexical_index_path.as_deref())?;

        Self::new(
            config,
            Arc::new(geocoder),
            Arc::new(elevation),
            Arc::new(features),
            Arc::new(index),
        )
    }

    /// Run a batch to completion.
    ///
    /// Concurrency is bounded by `workers`; the per-domain rate limiters
    /// inside the collaborators remain the real serialization points. When
    /// the batch deadline fires, in-flight records finish their current
    /// stage and fail with stage "timeout" at the next boundary, keeping
    /// everything written so far; queued records fail immediately.
    pub async fn run(&self, records: Vec<BiosampleRecord>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = records.len();
        info!(%run_id, records = total, workers = self.config.workers, "Starting batch");

        let cancel = CancellationToken::new();
        if let Some(deadline) = self.config.batch_deadline() {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut join_set: JoinSet<(usize, BiosampleRecord)> = JoinSet::new();

        for (idx, mut record) in records.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let geocoder = Arc::clone(&self.geocoder);
            let elevation = Arc::clone(&self.elevation);
            let features = Arc::clone(&self.features);
            let index = Arc::clone(&self.index);
            let config = self.config.clone();
            let thresholds = self.thresholds;

            join_set.spawn(async move {
                // Queued records give up their place when the deadline
                // fires rather than waiting out a permit
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            record.fail("worker_pool", "worker pool closed");
                            return (idx, record);
                        }
                    },
                    _ = cancel.cancelled() => {
                        record.fail("timeout", "batch deadline exceeded");
                        return (idx, record);
                    }
                };
                let record = process_record(
                    record,
                    &config,
                    &thresholds,
                    geocoder.as_ref(),
                    elevation.as_ref(),
                    features.as_ref(),
                    &index,
                    &cancel,
                )
                .await;
                (idx, record)
            });
        }

        let mut slots: Vec<Option<BiosampleRecord>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, record)) => slots[idx] = Some(record),
                Err(e) => warn!(error = %e, "Record task did not complete"),
            }
        }

        // A record lost to a task fault still gets a row in the report,
        // keyed by its input id.
        let records: Vec<BiosampleRecord> = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| match slot {
                Some(record) => record,
                None => {
                    let mut record = BiosampleRecord::new(id, None, None, None);
                    record.fail("worker_pool", "record task aborted");
                    record
                }
            })
            .collect();

        let summary = BatchSummary::from_records(&records, &self.config);
        info!(%run_id, "{}", summary.display_string());

        BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            records,
            summary,
        }
    }
}

/// Percent difference between two elevations, on the mean of magnitudes.
/// Zero when both values are zero.
pub fn elevation_percent_difference(asserted: f64, resolved: f64) -> f64 {
    let denom = (asserted.abs() + resolved.abs()) / 2.0;
    if denom == 0.0 {
        0.0
    } else {
        (asserted - resolved).abs() / denom * 100.0
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_record(
    mut record: BiosampleRecord,
    config: &EnrichConfig,
    thresholds: &ValidatorThresholds,
    geocoder: &dyn Geocoder,
    elevation: &dyn ElevationProvider,
    features: &dyn FeatureProvider,
    index: &LexicalIndex,
    cancel: &CancellationToken,
) -> BiosampleRecord {
    // Stage 1: location inference
    if cancel.is_cancelled() {
        record.fail("timeout", "batch deadline exceeded");
        return record;
    }
    if let Some(text) = record.asserted_location_text.clone() {
        match geocoder.geocode(&text).await {
            Ok(coord) => {
                if coord.is_none() {
                    debug!(id = %record.id, "No geocoding match for location text");
                }
                record.inferred_coordinate = coord;
            }
            Err(e) => {
                record.fail("location_inference", e.to_string());
                return record;
            }
        }
    }
    record.state = RecordState::LocationInferred;

    // Stage 2: elevation resolution. A deadline arriving mid-stage lets
    // the stage finish; the record fails at the next boundary with its
    // fields intact.
    if cancel.is_cancelled() {
        record.fail("timeout", "batch deadline exceeded");
        return record;
    }
    if let Some(coord) = record.asserted_coordinate {
        match elevation.elevation(coord).await {
            Ok(resolved) => {
                record.elevation_m = resolved;
                if let (Some(asserted), Some(resolved)) = (record.asserted_elevation_m, resolved) {
                    record.elevation_percent_difference =
                        Some(elevation_percent_difference(asserted, resolved));
                }
            }
            Err(e) => {
                record.fail("elevation", e.to_string());
                return record;
            }
        }
    }
    record.state = RecordState::ElevationResolved;

    if cancel.is_cancelled() {
        record.fail("timeout", "batch deadline exceeded");
        return record;
    }

    // Stage 3: coordinate validation
    let validation = validator::validate(
        record.asserted_coordinate,
        record.inferred_coordinate,
        thresholds,
    );
    record.validation = Some(validation);
    record.state = RecordState::Validated;

    if !validation.eligible_for_enrichment {
        debug!(
            id = %record.id,
            tier = %validation.confidence_tier,
            "Record not eligible for enrichment"
        );
        record.state = RecordState::EnrichmentSkipped;
        return record;
    }

    // Stage 4: feature fetch. Eligibility guarantees an asserted coordinate.
    if cancel.is_cancelled() {
        record.fail("timeout", "batch deadline exceeded");
        return record;
    }
    let Some(center) = record.asserted_coordinate else {
        record.fail("osm_features", "eligible record without asserted coordinate");
        return record;
    };
    match features
        .query_features(center, config.radius_m, &config.tag_keys)
        .await
    {
        Ok(found) => {
            record.osm_features = found;
        }
        Err(e) => {
            record.fail("osm_features", e.to_string());
            return record;
        }
    }
    record.state = RecordState::FeaturesFetched;

    // Stage 5: ontology normalization
    let normalizer = EnvoNormalizer::new(index, config);
    record.envo_annotations = normalizer.normalize(&record.osm_features);
    record.state = RecordState::Normalized;

    debug!(
        id = %record.id,
        features = record.osm_features.len(),
        annotations = record.envo_annotations.len(),
        "Record normalized"
    );
    record
}

/// Parse a batch of raw input records, failing fast on the first malformed
/// one.
pub fn parse_input(json: &str) -> biogeo_common::Result<Vec<BiosampleRecord>> {
    let raw: Vec<crate::types::RawRecord> = serde_json::from_str(json)
        .map_err(|e| biogeo_common::Error::InvalidInput(format!("input parse: {}", e)))?;
    raw.into_iter().map(|r| r.into_record()).collect()
}
