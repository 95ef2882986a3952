//! Ontology layer: lexical index, annotator, and EnvO normalizer

pub mod annotator;
pub mod lexical_index;
pub mod normalizer;

pub use annotator::LexicalAnnotator;
pub use lexical_index::{normalize_curie, resolve_index, LexicalIndex, TermEntry};
pub use normalizer::EnvoNormalizer;
