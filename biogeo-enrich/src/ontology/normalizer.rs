//! EnvO normalizer: geodata features to scored ontology annotations
//!
//! Turns fetched feature tags into annotation candidates, scores them, and
//! keeps the ones worth reporting. A term that cannot be resolved is skipped
//! with a warning; one bad term never sinks the rest of the record.

use crate::config::EnrichConfig;
use crate::ontology::annotator::{coverage, LexicalAnnotator, LexicalMatch};
use crate::ontology::lexical_index::LexicalIndex;
use crate::types::{EnvoAnnotation, OsmFeature};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Stateless per-run normalizer over a borrowed index.
pub struct EnvoNormalizer<'a> {
    annotator: LexicalAnnotator<'a>,
    min_match_length: usize,
    confidence_threshold: f64,
}

impl<'a> EnvoNormalizer<'a> {
    pub fn new(index: &'a LexicalIndex, config: &EnrichConfig) -> Self {
        Self {
            annotator: LexicalAnnotator::new(index),
            min_match_length: config.min_match_length,
            confidence_threshold: config.confidence_threshold,
        }
    }

    /// Annotate every feature and return the surviving annotations.
    ///
    /// Identical annotations arising from different features (same term,
    /// same source text, same span) collapse onto one entry.
    pub fn normalize(&self, features: &[OsmFeature]) -> Vec<EnvoAnnotation> {
        let mut seen: HashSet<(String, String, usize, usize)> = HashSet::new();
        let mut annotations = Vec::new();

        for feature in features {
            for annotation in self.normalize_feature(feature) {
                let key = (
                    annotation.term_curie.clone(),
                    annotation.source_text.clone(),
                    annotation.span_start,
                    annotation.span_end,
                );
                if seen.insert(key) {
                    annotations.push(annotation);
                }
            }
        }

        annotations
    }

    /// The text to annotate for one feature. Underscores in tag values stand
    /// for spaces; a bare "yes" value carries no vocabulary, so the tag key
    /// is used instead.
    pub fn source_text(feature: &OsmFeature) -> String {
        let raw = if feature.tag_value == "yes" {
            feature.tag_key.as_str()
        } else {
            feature.tag_value.as_str()
        };
        raw.replace('_', " ")
    }

    fn normalize_feature(&self, feature: &OsmFeature) -> Vec<EnvoAnnotation> {
        let source_text = Self::source_text(feature);
        let matches: Vec<LexicalMatch> = self
            .annotator
            .annotate(&source_text)
            .into_iter()
            .filter(|m| m.end - m.start >= self.min_match_length)
            .collect();

        if matches.is_empty() {
            debug!(
                tag_key = %feature.tag_key,
                tag_value = %feature.tag_value,
                "No ontology match for feature"
            );
            return Vec::new();
        }

        let spans: Vec<(usize, usize)> = matches.iter().map(|m| (m.start, m.end)).collect();
        let text_coverage = coverage(&spans, source_text.len());

        let mut annotations = Vec::new();
        for m in matches {
            let label = match self.annotator.label(&m.curie) {
                Some(label) => label.to_string(),
                None => {
                    warn!(curie = %m.curie, "Term missing from index, skipping annotation");
                    continue;
                }
            };

            let confidence = self.score(&source_text, &m, text_coverage);
            if confidence < self.confidence_threshold {
                debug!(
                    curie = %m.curie,
                    confidence,
                    threshold = self.confidence_threshold,
                    "Annotation below confidence threshold"
                );
                continue;
            }

            annotations.push(EnvoAnnotation {
                source_text: source_text.clone(),
                term_label: label,
                match_string: m.match_text,
                span_start: m.start,
                span_end: m.end,
                is_obsolete: self.annotator.is_obsolete(&m.curie),
                term_curie: m.curie,
                confidence,
            });
        }

        annotations
    }

    /// Confidence score for one match: a match spanning the whole trimmed
    /// text scores 1.0; otherwise a blend of text coverage and the match's
    /// own share of the text.
    fn score(&self, source_text: &str, m: &LexicalMatch, text_coverage: f64) -> f64 {
        let trimmed = source_text.trim();
        if m.end - m.start == trimmed.len() {
            return 1.0;
        }
        let specificity = (m.end - m.start) as f64 / source_text.len() as f64;
        0.4 * text_coverage + 0.6 * specificity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::lexical_index::TermEntry;
    use crate::types::GeometryKind;

    fn test_index() -> LexicalIndex {
        let term = |curie: &str, label: &str| TermEntry {
            curie: curie.to_string(),
            label: label.to_string(),
            synonyms: vec![],
            obsolete: false,
        };
        LexicalIndex::from_terms([
            term("ENVO:00000043", "wetland"),
            term("ENVO:00000054", "salt marsh"),
            term("ENVO:00000035", "marsh"),
            term("ENVO:00002006", "water"),
        ])
    }

    fn feature(tag_key: &str, tag_value: &str) -> OsmFeature {
        OsmFeature {
            tag_key: tag_key.to_string(),
            tag_value: tag_value.to_string(),
            geometry_kind: GeometryKind::Way,
            feature_distance_m: 100.0,
        }
    }

    fn normalizer(index: &LexicalIndex) -> EnvoNormalizer<'_> {
        EnvoNormalizer::new(index, &EnrichConfig::default())
    }

    #[test]
    fn test_exact_tag_value_scores_full_confidence() {
        let index = test_index();
        let annotations = normalizer(&index).normalize(&[feature("natural", "wetland")]);

        assert_eq!(annotations.len(), 1);
        let a = &annotations[0];
        assert_eq!(a.term_curie, "ENVO:00000043");
        assert_eq!(a.term_label, "wetland");
        assert_eq!(a.source_text, "wetland");
        assert_eq!((a.span_start, a.span_end), (0, 7));
        assert!((a.confidence - 1.0).abs() < 1e-12);
        assert!(!a.is_obsolete);
    }

    #[test]
    fn test_underscores_become_spaces() {
        let index = test_index();
        let annotations = normalizer(&index).normalize(&[feature("wetland", "salt_marsh")]);

        // "salt_marsh" → "salt marsh": the multi-word form covers the whole
        // text and scores 1.0
        let salt = annotations
            .iter()
            .find(|a| a.term_curie == "ENVO:00000054")
            .expect("salt marsh annotation");
        assert_eq!(salt.source_text, "salt marsh");
        assert_eq!((salt.span_start, salt.span_end), (0, 10));
        assert!((salt.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_yes_value_falls_back_to_tag_key() {
        let index = test_index();
        let annotations = normalizer(&index).normalize(&[feature("water", "yes")]);

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].term_curie, "ENVO:00002006");
        assert_eq!(annotations[0].source_text, "water");
    }

    #[test]
    fn test_partial_match_below_threshold_dropped() {
        let index = test_index();
        // "marsh" inside "brackish marsh flats": coverage 5/20, specificity
        // 5/20, confidence 0.25, below the 0.7 default threshold.
        let annotations = normalizer(&index).normalize(&[feature("natural", "brackish_marsh_flats")]);
        assert!(annotations.is_empty());
    }

    #[test]
    fn test_identical_annotations_deduplicated_across_features() {
        let index = test_index();
        let features = vec![feature("natural", "wetland"), feature("landuse", "wetland")];
        let annotations = normalizer(&index).normalize(&features);
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn test_no_match_yields_no_annotations() {
        let index = test_index();
        let annotations = normalizer(&index).normalize(&[feature("natural", "scree")]);
        assert!(annotations.is_empty());
    }

    #[test]
    fn test_min_match_length_filters_short_forms() {
        let index = LexicalIndex::from_terms([TermEntry {
            curie: "ENVO:1".into(),
            label: "ab".into(),
            synonyms: vec![],
            obsolete: false,
        }]);
        let annotations = normalizer(&index).normalize(&[feature("natural", "ab")]);
        assert!(annotations.is_empty());
    }
}
