//! Lexical annotator: surface-form matching over free text
//!
//! Finds every occurrence of every indexed surface form in a piece of text.
//! Matching is case-insensitive (ASCII lowercasing, so byte offsets are
//! preserved) and purely lexical; scoring and filtering happen downstream
//! in the normalizer.

use crate::ontology::lexical_index::LexicalIndex;

/// One raw surface-form occurrence. Spans are byte offsets into the input
/// text, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalMatch {
    /// Normalized CURIE of the matched term
    pub curie: String,
    /// The surface form text as it was matched (lowercased)
    pub match_text: String,
    /// Start offset, inclusive
    pub start: usize,
    /// End offset, exclusive
    pub end: usize,
}

/// Annotator over a borrowed index.
pub struct LexicalAnnotator<'a> {
    index: &'a LexicalIndex,
}

/// True for characters that can extend a word. Underscore counts so that
/// "salt_marsh" does not yield a bare "marsh" match.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> LexicalAnnotator<'a> {
    pub fn new(index: &'a LexicalIndex) -> Self {
        Self { index }
    }

    /// Primary label for a term CURIE.
    pub fn label(&self, curie: &str) -> Option<&str> {
        self.index.label(curie)
    }

    /// Obsolescence flag for a term CURIE.
    pub fn is_obsolete(&self, curie: &str) -> bool {
        self.index.is_obsolete(curie)
    }

    /// Find every indexed surface form occurring in `text`.
    ///
    /// Single-word forms only match at word boundaries ("grass" does not
    /// match inside "grasslands"); multi-word forms match as substrings.
    /// Overlapping matches are all returned. Results are sorted by start
    /// offset, longer matches first on ties.
    pub fn annotate(&self, text: &str) -> Vec<LexicalMatch> {
        let haystack = text.to_ascii_lowercase();
        let mut matches = Vec::new();

        for form in self.index.surface_forms() {
            for (start, found) in haystack.match_indices(form.text.as_str()) {
                let end = start + found.len();
                if !form.multiword && !Self::at_word_boundary(&haystack, start, end) {
                    continue;
                }
                matches.push(LexicalMatch {
                    curie: form.curie.clone(),
                    match_text: form.text.clone(),
                    start,
                    end,
                });
            }
        }

        matches.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| b.end.cmp(&a.end))
                .then_with(|| a.curie.cmp(&b.curie))
        });
        matches
    }

    fn at_word_boundary(haystack: &str, start: usize, end: usize) -> bool {
        let before_ok = start == 0
            || haystack[..start]
                .chars()
                .next_back()
                .map(|c| !is_word_char(c))
                .unwrap_or(true);
        let after_ok = end == haystack.len()
            || haystack[end..]
                .chars()
                .next()
                .map(|c| !is_word_char(c))
                .unwrap_or(true);
        before_ok && after_ok
    }
}

/// Fraction of `text_length` covered by the given half-open spans.
///
/// Overlapping and near-adjacent spans (gap of at most one character) are
/// merged before summing, so stacked matches do not inflate coverage.
/// Returns 0.0 for empty input or zero-length text.
pub fn coverage(spans: &[(usize, usize)], text_length: usize) -> f64 {
    if spans.is_empty() || text_length == 0 {
        return 0.0;
    }

    let mut sorted: Vec<(usize, usize)> = spans.to_vec();
    sorted.sort_unstable();

    let mut covered = 0usize;
    let (mut cur_start, mut cur_end) = sorted[0];
    for &(start, end) in &sorted[1..] {
        if start <= cur_end + 1 {
            cur_end = cur_end.max(end);
        } else {
            covered += cur_end - cur_start;
            cur_start = start;
            cur_end = end;
        }
    }
    covered += cur_end - cur_start;

    covered as f64 / text_length as f64
}
