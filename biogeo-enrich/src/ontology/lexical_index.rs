//! Lexical index: ontology terms and their surface forms
//!
//! Maps ontology terms to the labels and synonyms the annotator can match in
//! free text. Built once per run (or loaded from a JSON snapshot) and passed
//! by reference wherever it is needed; never mutated after construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One ontology term supplied to the index builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermEntry {
    /// Term CURIE, any prefix case (normalized on ingest)
    pub curie: String,
    /// Primary label
    pub label: String,
    /// Additional surface forms (exact synonyms)
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Whether the ontology marks the term obsolete
    #[serde(default)]
    pub obsolete: bool,
}

/// Stored term data, keyed by normalized CURIE.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TermRecord {
    label: String,
    obsolete: bool,
}

/// One matchable surface form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceForm {
    /// Lowercased form text
    pub text: String,
    /// Normalized CURIE of the term this form belongs to
    pub curie: String,
    /// Whether the form contains whitespace (multi-word forms skip the
    /// whole-word restriction)
    pub multiword: bool,
}

/// Immutable term/surface-form index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    terms: HashMap<String, TermRecord>,
    surface_forms: Vec<SurfaceForm>,
}

/// Normalize a CURIE to upper-case prefix form ("envo:01000813" →
/// "ENVO:01000813"). The local id is left untouched.
pub fn normalize_curie(curie: &str) -> String {
    match curie.split_once(':') {
        Some((prefix, local)) => format!("{}:{}", prefix.to_ascii_uppercase(), local),
        None => curie.to_string(),
    }
}

impl LexicalIndex {
    /// Build an index from term entries.
    ///
    /// Surface forms are lowercased and sorted so annotation order is
    /// deterministic regardless of input order.
    pub fn from_terms(entries: impl IntoIterator<Item = TermEntry>) -> Self {
        let mut terms = HashMap::new();
        let mut surface_forms = Vec::new();

        for entry in entries {
            let curie = normalize_curie(&entry.curie);

            for form in std::iter::once(&entry.label).chain(entry.synonyms.iter()) {
                let text = form.trim().to_ascii_lowercase();
                if text.is_empty() {
                    continue;
                }
                surface_forms.push(SurfaceForm {
                    multiword: text.contains(char::is_whitespace),
                    text,
                    curie: curie.clone(),
                });
            }

            terms.insert(
                curie,
                TermRecord {
                    label: entry.label,
                    obsolete: entry.obsolete,
                },
            );
        }

        surface_forms.sort_by(|a, b| a.text.cmp(&b.text).then_with(|| a.curie.cmp(&b.curie)));
        surface_forms.dedup_by(|a, b| a.text == b.text && a.curie == b.curie);

        Self {
            terms,
            surface_forms,
        }
    }

    /// Primary label for a term; None when the CURIE is not indexed.
    pub fn label(&self, curie: &str) -> Option<&str> {
        self.terms
            .get(&normalize_curie(curie))
            .map(|t| t.label.as_str())
    }

    /// Obsolescence flag; false when the term is unknown or the underlying
    /// data lacks the information.
    pub fn is_obsolete(&self, curie: &str) -> bool {
        self.terms
            .get(&normalize_curie(curie))
            .map(|t| t.obsolete)
            .unwrap_or(false)
    }

    /// All matchable surface forms, sorted.
    pub fn surface_forms(&self) -> &[SurfaceForm] {
        &self.surface_forms
    }

    /// Number of indexed terms.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Persist a snapshot to `path` as JSON.
    pub fn save(&self, path: &Path) -> biogeo_common::Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| biogeo_common::Error::Internal(format!("serialize index: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), terms = self.term_count(), "Saved lexical index snapshot");
        Ok(())
    }

    /// Load a snapshot previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> biogeo_common::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            biogeo_common::Error::NotFound(format!("lexical index {}: {}", path.display(), e))
        })?;
        let index: Self = serde_json::from_str(&content).map_err(|e| {
            biogeo_common::Error::Config(format!("lexical index {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), terms = index.term_count(), "Loaded lexical index snapshot");
        Ok(index)
    }

    /// Abridged seed lexicon of common environmental terms, used when no
    /// snapshot is configured. A production run should supply a snapshot
    /// built from the full ontology.
    pub fn builtin() -> Self {
        let term = |curie: &str, label: &str, synonyms: &[&str]| TermEntry {
            curie: curie.to_string(),
            label: label.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            obsolete: false,
        };

        Self::from_terms([
            term("ENVO:00000020", "lake", &[]),
            term("ENVO:00000022", "river", &[]),
            term("ENVO:00000023", "stream", &["creek", "brook"]),
            term("ENVO:00000035", "marsh", &[]),
            term("ENVO:00000043", "wetland", &[]),
            term("ENVO:00000045", "estuary", &[]),
            term("ENVO:00000054", "salt marsh", &["saltmarsh"]),
            term("ENVO:00000062", "meadow", &[]),
            term("ENVO:00000077", "agricultural field", &["farmland", "cropland"]),
            term("ENVO:00000091", "beach", &[]),
            term("ENVO:00000097", "desert", &[]),
            term("ENVO:00000098", "dune", &["sand dune"]),
            term("ENVO:00000104", "grassland", &[]),
            term("ENVO:00000106", "woodland", &[]),
            term("ENVO:00000111", "forest", &[]),
            term("ENVO:00000292", "spring", &[]),
            term("ENVO:00000309", "bog", &["peat bog"]),
            term("ENVO:00000316", "swamp", &[]),
            term("ENVO:00001998", "soil", &[]),
            term("ENVO:00002006", "water", &[]),
            term("ENVO:00002007", "sediment", &[]),
            term("ENVO:00002011", "fresh water", &["freshwater"]),
            term("ENVO:00002149", "sea water", &["seawater"]),
            term("ENVO:00005801", "rhizosphere", &[]),
            term("ENVO:01000813", "astronomical body part", &[]),
        ])
    }
}

/// Resolve the index per configuration: load the snapshot when a path is
/// given (missing snapshot is a fail-fast configuration error), otherwise
/// fall back to the built-in seed lexicon.
pub fn resolve_index(path: Option<&Path>) -> biogeo_common::Result<LexicalIndex> {
    match path {
        Some(p) => LexicalIndex::load(p),
        None => {
            tracing::warn!("No lexical index snapshot configured, using built-in seed lexicon");
            Ok(LexicalIndex::builtin())
        }
    }
}
