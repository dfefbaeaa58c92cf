//! Threshold cascade over ranked candidates.
//!
//! The policy is a table of steps tried in fixed order. Each step has a
//! similarity threshold and an outcome; the first step whose threshold is
//! cleared by at least one candidate decides. With the default table:
//!
//! | Step | Threshold | Outcome |
//! |------|-----------|---------|
//! | 1 | `0.85` | accept the most similar candidate |
//! | 2 | `0.75` | accept the most similar candidate |
//! | 3 | `0.65` | accept the most similar candidate |
//! | fallback | — | best candidate below `0.5` → skip, otherwise undecided |
//!
//! Whatever the outcome, the selection carries the candidates to show the
//! advisory model: the whole accepting tier (capped), or the single best
//! candidate when no tier accepted.

use crate::models::{MatchDecision, ScoredCandidate};

pub const DEFAULT_THRESHOLDS: [f32; 3] = [0.85, 0.75, 0.65];
pub const DEFAULT_SKIP_FLOOR: f32 = 0.5;

/// What a step produces when its threshold is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Accept the top candidate of the tier.
    Accept,
}

impl StepOutcome {
    fn build(self, top: &ScoredCandidate<'_>, threshold: f32) -> MatchDecision {
        match self {
            StepOutcome::Accept => MatchDecision::accepted(top, threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeStep {
    pub threshold: f32,
    pub outcome: StepOutcome,
}

/// The result of running the cascade.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub decision: MatchDecision,
    /// Ranked candidates to list in the advisory prompt.
    pub references: Vec<ScoredCandidate<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadePolicy {
    steps: Vec<CascadeStep>,
    skip_floor: f32,
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self::new(&DEFAULT_THRESHOLDS, DEFAULT_SKIP_FLOOR)
    }
}

impl CascadePolicy {
    /// Build a policy accepting at each of `thresholds`, in the given order.
    ///
    /// Thresholds are expected to be descending; config validation enforces it.
    pub fn new(thresholds: &[f32], skip_floor: f32) -> Self {
        let steps = thresholds
            .iter()
            .map(|&threshold| CascadeStep {
                threshold,
                outcome: StepOutcome::Accept,
            })
            .collect();
        Self { steps, skip_floor }
    }

    pub fn steps(&self) -> &[CascadeStep] {
        &self.steps
    }

    pub fn skip_floor(&self) -> f32 {
        self.skip_floor
    }

    /// Choose a decision for `ranked`, which must be sorted by similarity
    /// descending (see [`rank_candidates`](crate::rank::rank_candidates)).
    ///
    /// At most `max_references` candidates are returned for the prompt.
    pub fn select<'a>(&self, ranked: &[ScoredCandidate<'a>], max_references: usize) -> Selection<'a> {
        let Some(best) = ranked.first() else {
            return Selection {
                decision: MatchDecision::skip(),
                references: Vec::new(),
            };
        };

        for step in &self.steps {
            let tier: Vec<ScoredCandidate<'a>> = ranked
                .iter()
                .filter(|c| c.similarity >= step.threshold)
                .take(max_references.max(1))
                .copied()
                .collect();
            if let Some(top) = tier.first() {
                return Selection {
                    decision: step.outcome.build(top, step.threshold),
                    references: tier,
                };
            }
        }

        let decision = if best.similarity < self.skip_floor {
            MatchDecision::skip()
        } else {
            MatchDecision::undecided()
        };
        Selection {
            decision,
            references: vec![*best],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogEntry, DecisionKind, SKIP_LABEL};

    fn entries(n: usize) -> Vec<CatalogEntry> {
        (0..n)
            .map(|i| CatalogEntry {
                id: format!("sku-{}", i),
                name: format!("item {}", i),
                category_path: format!("Root>Leaf{}", i),
                embedding: vec![1.0],
            })
            .collect()
    }

    fn scored<'a>(entries: &'a [CatalogEntry], sims: &[f32]) -> Vec<ScoredCandidate<'a>> {
        entries
            .iter()
            .zip(sims)
            .map(|(entry, &similarity)| ScoredCandidate { entry, similarity })
            .collect()
    }

    #[test]
    fn empty_candidates_skip() {
        let sel = CascadePolicy::default().select(&[], 10);
        assert_eq!(sel.decision, MatchDecision::skip());
        assert!(sel.references.is_empty());
    }

    #[test]
    fn accepts_top_of_highest_tier() {
        let e = entries(3);
        let ranked = scored(&e, &[0.93, 0.88, 0.70]);
        let sel = CascadePolicy::default().select(&ranked, 10);
        assert_eq!(sel.decision.kind, DecisionKind::Accepted);
        assert_eq!(sel.decision.tier, Some(0.85));
        assert_eq!(sel.decision.matched_id, "sku-0");
        assert_eq!(sel.decision.confidence_label, "93.0");
        assert_eq!(sel.references.len(), 2);
    }

    #[test]
    fn monotonic_walk_through_tiers() {
        let e = entries(1);
        let policy = CascadePolicy::default();
        let cases: [(f32, DecisionKind, Option<f32>); 5] = [
            (0.9, DecisionKind::Accepted, Some(0.85)),
            (0.8, DecisionKind::Accepted, Some(0.75)),
            (0.7, DecisionKind::Accepted, Some(0.65)),
            (0.6, DecisionKind::Undecided, None),
            (0.4, DecisionKind::Skipped, None),
        ];
        for (sim, kind, tier) in cases {
            let ranked = scored(&e, &[sim]);
            let sel = policy.select(&ranked, 10);
            assert_eq!(sel.decision.kind, kind, "similarity {}", sim);
            assert_eq!(sel.decision.tier, tier, "similarity {}", sim);
            assert_eq!(sel.references.len(), 1);
        }
    }

    #[test]
    fn below_floor_is_explicit_skip() {
        let e = entries(3);
        let ranked = scored(&e, &[0.45, 0.30, 0.10]);
        let sel = CascadePolicy::default().select(&ranked, 10);
        assert_eq!(sel.decision.kind, DecisionKind::Skipped);
        assert_eq!(sel.decision.category_path, "");
        assert_eq!(sel.decision.confidence_label, SKIP_LABEL);
        // the best candidate is still offered to the advisory prompt
        assert_eq!(sel.references.len(), 1);
        assert_eq!(sel.references[0].entry.id, "sku-0");
    }

    #[test]
    fn undecided_band_has_no_category() {
        let e = entries(2);
        let ranked = scored(&e, &[0.5, 0.2]);
        let sel = CascadePolicy::default().select(&ranked, 10);
        assert_eq!(sel.decision.kind, DecisionKind::Undecided);
        assert_eq!(sel.decision.category_path, "");
        assert_eq!(sel.decision.confidence_label, "");
    }

    #[test]
    fn threshold_is_inclusive() {
        let e = entries(1);
        let ranked = scored(&e, &[0.75]);
        let sel = CascadePolicy::default().select(&ranked, 10);
        assert_eq!(sel.decision.tier, Some(0.75));
    }

    #[test]
    fn tie_prefers_earlier_entry() {
        let e = entries(2);
        let ranked = scored(&e, &[0.8, 0.8]);
        let sel = CascadePolicy::default().select(&ranked, 10);
        assert_eq!(sel.decision.matched_id, "sku-0");
    }

    #[test]
    fn references_are_capped() {
        let e = entries(6);
        let ranked = scored(&e, &[0.99, 0.98, 0.97, 0.96, 0.95, 0.94]);
        let sel = CascadePolicy::default().select(&ranked, 4);
        assert_eq!(sel.references.len(), 4);
        assert_eq!(sel.decision.matched_id, "sku-0");
    }

    #[test]
    fn custom_table_is_tried_in_order() {
        let e = entries(1);
        let policy = CascadePolicy::new(&[0.95, 0.6], 0.3);
        assert_eq!(policy.steps().len(), 2);
        let ranked = scored(&e, &[0.7]);
        let sel = policy.select(&ranked, 10);
        assert_eq!(sel.decision.tier, Some(0.6));
        let ranked = scored(&e, &[0.35]);
        assert_eq!(
            policy.select(&ranked, 10).decision.kind,
            DecisionKind::Undecided
        );
    }
}
