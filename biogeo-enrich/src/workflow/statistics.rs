//! Batch summary statistics
//!
//! Aggregate counters for one batch run, plus an echo of the thresholds the
//! run used so a report is interpretable on its own.

use crate::config::EnrichConfig;
use crate::types::{BiosampleRecord, RecordState, TierCounts};
use serde::Serialize;

/// Thresholds in effect for the run, echoed into the report.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdEcho {
    pub max_distance_km: f64,
    pub tier_high_km: f64,
    pub tier_medium_km: f64,
    pub radius_m: f64,
    pub min_match_length: usize,
    pub confidence_threshold: f64,
}

impl From<&EnrichConfig> for ThresholdEcho {
    fn from(config: &EnrichConfig) -> Self {
        Self {
            max_distance_km: config.max_distance_km,
            tier_high_km: config.tier_high_km,
            tier_medium_km: config.tier_medium_km,
            radius_m: config.radius_m,
            min_match_length: config.min_match_length,
            confidence_threshold: config.confidence_threshold,
        }
    }
}

/// Aggregate counters for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Total records in the batch
    pub total_records: usize,
    /// Records per confidence tier (validated records only)
    pub by_confidence_tier: TierCounts,
    /// Records per terminal state
    pub by_terminal_state: TierCounts,
    /// Total geodata features fetched across all records
    pub feature_count: usize,
    /// Total ontology annotations produced across all records
    pub annotation_count: usize,
    /// Records with at least one annotation
    pub records_with_annotations: usize,
    /// Thresholds the run used
    pub thresholds: ThresholdEcho,
}

impl BatchSummary {
    pub fn from_records(records: &[BiosampleRecord], config: &EnrichConfig) -> Self {
        let mut by_confidence_tier = TierCounts::new();
        let mut by_terminal_state = TierCounts::new();
        let mut feature_count = 0;
        let mut annotation_count = 0;
        let mut records_with_annotations = 0;

        for record in records {
            if let Some(validation) = &record.validation {
                *by_confidence_tier
                    .entry(validation.confidence_tier.to_string())
                    .or_default() += 1;
            }
            if record.state.is_terminal() {
                *by_terminal_state.entry(record.state.to_string()).or_default() += 1;
            }
            feature_count += record.osm_features.len();
            annotation_count += record.envo_annotations.len();
            if !record.envo_annotations.is_empty() {
                records_with_annotations += 1;
            }
        }

        Self {
            total_records: records.len(),
            by_confidence_tier,
            by_terminal_state,
            feature_count,
            annotation_count,
            records_with_annotations,
            thresholds: ThresholdEcho::from(config),
        }
    }

    /// One-line human-readable form for logs.
    pub fn display_string(&self) -> String {
        format!(
            "{} records: {} normalized, {} skipped, {} failed; {} features, {} annotations on {} records",
            self.total_records,
            self.state_count(RecordState::Normalized),
            self.state_count(RecordState::EnrichmentSkipped),
            self.state_count(RecordState::Failed),
            self.feature_count,
            self.annotation_count,
            self.records_with_annotations,
        )
    }

    fn state_count(&self, state: RecordState) -> usize {
        self.by_terminal_state
            .get(&state.to_string())
            .copied()
            .unwrap_or(0)
    }
}
