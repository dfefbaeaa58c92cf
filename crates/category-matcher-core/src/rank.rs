//! Similarity ranking of filtered candidates.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{CatalogEntry, ScoredCandidate};

/// Score every candidate against `query` and sort by similarity, descending.
///
/// The sort is stable, so exact ties keep the candidates' catalog order.
pub fn rank_candidates<'a>(query: &[f32], candidates: &[&'a CatalogEntry]) -> Vec<ScoredCandidate<'a>> {
    let mut scored: Vec<ScoredCandidate<'a>> = candidates
        .iter()
        .map(|&entry| ScoredCandidate {
            entry,
            similarity: cosine_similarity(query, &entry.embedding),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });

    scored
}
