//! Lexical candidate narrowing.
//!
//! The first few whitespace-separated words of a product name usually name its
//! general type ("генератор бензиновый ...", "амортизатор задний ..."). The
//! filter keeps catalog entries whose name contains any of those words and
//! falls back to the whole catalog when that leaves too few entries.

use crate::catalog::Catalog;
use crate::models::CatalogEntry;

/// Number of leading words that form the type phrase.
pub const DEFAULT_TYPE_TOKENS: usize = 3;
/// Below this many lexical matches the filter is discarded.
pub const DEFAULT_MIN_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub type_tokens: usize,
    pub min_candidates: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            type_tokens: DEFAULT_TYPE_TOKENS,
            min_candidates: DEFAULT_MIN_CANDIDATES,
        }
    }
}

/// Candidates selected for ranking, in catalog order.
#[derive(Debug, Clone)]
pub struct FilteredCandidates<'a> {
    pub entries: Vec<&'a CatalogEntry>,
    /// Lower-cased type phrase used for matching.
    pub type_phrase: String,
    /// Number of entries the lexical match found (before any fallback).
    pub lexical_matches: usize,
    /// `false` when the filter was discarded in favour of the full catalog.
    pub narrowed: bool,
}

/// Lower-cased leading words of `raw_name`.
pub fn type_tokens(raw_name: &str, n: usize) -> Vec<String> {
    raw_name
        .to_lowercase()
        .split_whitespace()
        .take(n)
        .map(str::to_string)
        .collect()
}

/// Narrow `catalog` to entries whose name contains any type-phrase word.
///
/// Matching is a case-insensitive substring test. If fewer than
/// `params.min_candidates` entries match, every catalog entry is returned.
pub fn filter_candidates<'a>(
    catalog: &'a Catalog,
    raw_name: &str,
    params: &FilterParams,
) -> FilteredCandidates<'a> {
    let tokens = type_tokens(raw_name, params.type_tokens);
    let type_phrase = tokens.join(" ");

    let matched: Vec<&CatalogEntry> = if tokens.is_empty() {
        Vec::new()
    } else {
        catalog
            .entries()
            .iter()
            .filter(|e| {
                let name = e.name.to_lowercase();
                tokens.iter().any(|t| name.contains(t.as_str()))
            })
            .collect()
    };

    let lexical_matches = matched.len();
    if lexical_matches < params.min_candidates {
        return FilteredCandidates {
            entries: catalog.entries().iter().collect(),
            type_phrase,
            lexical_matches,
            narrowed: false,
        };
    }

    FilteredCandidates {
        entries: matched,
        type_phrase,
        lexical_matches,
        narrowed: true,
    }
}
