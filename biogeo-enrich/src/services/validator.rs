//! Coordinate validation and confidence scoring
//!
//! Pure decision logic, no I/O: compares the asserted coordinate against the
//! independently inferred one and decides whether the record is trustworthy
//! enough for downstream enrichment.

use crate::config::EnrichConfig;
use crate::types::{ConfidenceTier, ValidationResult};
use biogeo_common::{geodesy, Coordinate};
use serde::{Deserialize, Serialize};

/// Tier thresholds in kilometers. Inclusive lower bounds: a distance exactly
/// at a boundary falls into the wider tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidatorThresholds {
    /// Below this: HIGH
    pub tier_high_km: f64,
    /// Below this: MEDIUM
    pub tier_medium_km: f64,
    /// At or below this: LOW (eligible); above: REJECTED
    pub max_distance_km: f64,
}

impl Default for ValidatorThresholds {
    fn default() -> Self {
        Self {
            tier_high_km: 1.0,
            tier_medium_km: 5.0,
            max_distance_km: 10.0,
        }
    }
}

impl From<&EnrichConfig> for ValidatorThresholds {
    fn from(config: &EnrichConfig) -> Self {
        Self {
            tier_high_km: config.tier_high_km,
            tier_medium_km: config.tier_medium_km,
            max_distance_km: config.max_distance_km,
        }
    }
}

/// Classify a distance into a confidence tier.
pub fn tier_for_distance(distance_km: f64, thresholds: &ValidatorThresholds) -> ConfidenceTier {
    if distance_km < thresholds.tier_high_km {
        ConfidenceTier::High
    } else if distance_km < thresholds.tier_medium_km {
        ConfidenceTier::Medium
    } else if distance_km <= thresholds.max_distance_km {
        ConfidenceTier::Low
    } else {
        ConfidenceTier::Rejected
    }
}

/// Validate an asserted coordinate against an inferred one.
///
/// When either coordinate is absent the result is REJECTED with a zero
/// distance sentinel; the absence is the reason, not the distance. A record
/// is eligible for enrichment iff both coordinates are present and the
/// distance is within `max_distance_km`.
pub fn validate(
    asserted: Option<Coordinate>,
    inferred: Option<Coordinate>,
    thresholds: &ValidatorThresholds,
) -> ValidationResult {
    let (Some(asserted), Some(inferred)) = (asserted, inferred) else {
        return ValidationResult {
            distance_km: 0.0,
            confidence_tier: ConfidenceTier::Rejected,
            eligible_for_enrichment: false,
        };
    };

    let distance_km = geodesy::distance_km(asserted, inferred);
    let confidence_tier = tier_for_distance(distance_km, thresholds);

    ValidationResult {
        distance_km,
        confidence_tier,
        eligible_for_enrichment: confidence_tier != ConfidenceTier::Rejected,
    }
}
