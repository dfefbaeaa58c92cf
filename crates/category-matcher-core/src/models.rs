//! Core data models for product categorization.
//!
//! These types represent the reference catalog, incoming product rows, and the
//! per-row results that flow through the matching pipeline.

use serde::{Deserialize, Serialize};

/// Separator between hierarchy levels in a category path.
pub const CATEGORY_DELIMITER: char = '>';

/// Confidence label attached to an explicit skip decision.
pub const SKIP_LABEL: &str = "низкое качество совпадения";

/// A reference catalog row with its precomputed embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Stable identifier (the catalog SKU).
    pub id: String,
    pub name: String,
    /// Hierarchy levels joined with [`CATEGORY_DELIMITER`], root first.
    pub category_path: String,
    pub embedding: Vec<f32>,
}

/// One input row to categorize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub raw_name: String,
    #[serde(default)]
    pub code: String,
}

impl ProductQuery {
    pub fn new(raw_name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            code: code.into(),
        }
    }
}

/// A catalog entry scored against one query embedding.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub entry: &'a CatalogEntry,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f32,
}

impl ScoredCandidate<'_> {
    /// Similarity as a percentage with one decimal, e.g. `"87.4"`.
    pub fn percent_label(&self) -> String {
        format!("{:.1}", self.similarity * 100.0)
    }
}

/// How the cascade arrived at a [`MatchDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// A candidate cleared one of the cascade thresholds.
    Accepted,
    /// Explicit skip: nothing usable, or the best candidate is below the floor.
    Skipped,
    /// Best candidate sits between the floor and the lowest threshold.
    /// Reported like a skip (empty category, no label).
    Undecided,
}

/// Formal categorization decision for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub category_path: String,
    pub confidence_label: String,
    pub matched_id: String,
    pub kind: DecisionKind,
    /// Threshold of the cascade tier that accepted the match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<f32>,
}

impl MatchDecision {
    pub fn accepted(candidate: &ScoredCandidate<'_>, threshold: f32) -> Self {
        Self {
            category_path: candidate.entry.category_path.clone(),
            confidence_label: candidate.percent_label(),
            matched_id: candidate.entry.id.clone(),
            kind: DecisionKind::Accepted,
            tier: Some(threshold),
        }
    }

    pub fn skip() -> Self {
        Self {
            category_path: String::new(),
            confidence_label: SKIP_LABEL.to_string(),
            matched_id: String::new(),
            kind: DecisionKind::Skipped,
            tier: None,
        }
    }

    pub fn undecided() -> Self {
        Self {
            category_path: String::new(),
            confidence_label: String::new(),
            matched_id: String::new(),
            kind: DecisionKind::Undecided,
            tier: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.kind == DecisionKind::Accepted
    }
}

/// Result record for a successfully processed row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMatch {
    pub code: String,
    pub name: String,
    pub category_path: String,
    pub matched_id: String,
    pub confidence_label: String,
    /// Raw text from the cross-check model; `None` when it was unavailable.
    pub advisory_text: Option<String>,
    pub decision: DecisionKind,
}

/// Result record for a row that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub code: String,
    pub name: String,
    pub message: String,
}

/// Per-row outcome. A batch always yields one of these per input row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Success(ProductMatch),
    Error(RowFailure),
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Success(_))
    }

    pub fn as_match(&self) -> Option<&ProductMatch> {
        match self {
            RowOutcome::Success(m) => Some(m),
            RowOutcome::Error(_) => None,
        }
    }
}
