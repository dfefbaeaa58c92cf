//! Per-product matching pipeline.
//!
//! A [`Matcher`] is constructed once at startup from a loaded [`Catalog`], an
//! [`Encoder`], and a [`Verifier`]. It holds no mutable state, so one instance
//! serves every request.

use std::sync::Arc;

use crate::advisory::{build_prompt, Verifier, SYSTEM_INSTRUCTION};
use crate::cascade::{CascadePolicy, Selection};
use crate::catalog::Catalog;
use crate::chain::CategoryChain;
use crate::embedding::Encoder;
use crate::error::RowError;
use crate::filter::{filter_candidates, FilterParams};
use crate::models::{MatchDecision, ProductMatch, ProductQuery, RowFailure, RowOutcome};
use crate::rank::rank_candidates;

/// Maximum number of candidates listed in the advisory prompt.
pub const DEFAULT_PROMPT_CANDIDATES: usize = 10;

/// Tuning for the filter, cascade, and prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherParams {
    pub filter: FilterParams,
    pub cascade: CascadePolicy,
    pub prompt_candidates: usize,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            filter: FilterParams::default(),
            cascade: CascadePolicy::default(),
            prompt_candidates: DEFAULT_PROMPT_CANDIDATES,
        }
    }
}

/// Filter, rank, and cascade output for one product, before the cross-check.
#[derive(Debug, Clone)]
pub struct Evaluation<'a> {
    pub selection: Selection<'a>,
    pub candidate_count: usize,
    pub narrowed: bool,
}

impl Evaluation<'_> {
    pub fn decision(&self) -> &MatchDecision {
        &self.selection.decision
    }
}

pub struct Matcher {
    catalog: Arc<Catalog>,
    encoder: Arc<dyn Encoder>,
    verifier: Arc<dyn Verifier>,
    params: MatcherParams,
}

impl Matcher {
    pub fn new(
        catalog: Arc<Catalog>,
        encoder: Arc<dyn Encoder>,
        verifier: Arc<dyn Verifier>,
        params: MatcherParams,
    ) -> Self {
        Self {
            catalog,
            encoder,
            verifier,
            params,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    pub fn verifier(&self) -> &dyn Verifier {
        self.verifier.as_ref()
    }

    pub fn params(&self) -> &MatcherParams {
        &self.params
    }

    /// Run filter → rank → cascade for one product name.
    ///
    /// An empty catalog yields a skip decision without encoding.
    pub async fn evaluate(&self, raw_name: &str) -> Result<Evaluation<'_>, RowError> {
        let name = raw_name.trim();
        if name.is_empty() {
            return Err(RowError::EmptyName);
        }

        if self.catalog.is_empty() {
            tracing::debug!(product = name, "catalog is empty, skipping");
            return Ok(Evaluation {
                selection: Selection {
                    decision: MatchDecision::skip(),
                    references: Vec::new(),
                },
                candidate_count: 0,
                narrowed: false,
            });
        }

        let filtered = filter_candidates(&self.catalog, name, &self.params.filter);
        if filtered.narrowed {
            tracing::debug!(
                product = name,
                type_phrase = %filtered.type_phrase,
                candidates = filtered.entries.len(),
                "narrowed candidates by type phrase"
            );
        } else {
            tracing::debug!(
                product = name,
                type_phrase = %filtered.type_phrase,
                lexical_matches = filtered.lexical_matches,
                "too few type matches, using full catalog"
            );
        }

        let query_vec = self
            .encoder
            .encode(name)
            .await
            .map_err(|e| RowError::Encoding {
                reason: format!("{:#}", e),
            })?;
        if let Some(expected) = self.catalog.dims() {
            if query_vec.len() != expected {
                return Err(RowError::DimensionMismatch {
                    expected,
                    actual: query_vec.len(),
                });
            }
        }

        let ranked = rank_candidates(&query_vec, &filtered.entries);
        let selection = self
            .params
            .cascade
            .select(&ranked, self.params.prompt_candidates);

        Ok(Evaluation {
            selection,
            candidate_count: filtered.entries.len(),
            narrowed: filtered.narrowed,
        })
    }

    /// Categorize one product and attach the advisory answer.
    ///
    /// Never fails: row-local problems become [`RowOutcome::Error`].
    pub async fn match_product(&self, query: &ProductQuery) -> RowOutcome {
        let name = query.raw_name.trim();
        let code = query.code.trim();

        let evaluation = match self.evaluate(name).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!(product = name, code, error = %e, "row failed");
                return RowOutcome::Error(RowFailure {
                    code: code.to_string(),
                    name: name.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let decision = evaluation.selection.decision.clone();
        match decision.tier {
            Some(threshold) => tracing::info!(
                product = name,
                category = %decision.category_path,
                confidence = %decision.confidence_label,
                threshold,
                "accepted match"
            ),
            None => tracing::info!(
                product = name,
                decision = ?decision.kind,
                "no candidate cleared the cascade"
            ),
        }

        let chain = CategoryChain::parse(&decision.category_path);
        let prompt = build_prompt(name, &chain, &evaluation.selection.references);
        let advisory = self.verifier.verify(SYSTEM_INSTRUCTION, &prompt).await;
        if !advisory.is_available() {
            tracing::warn!(product = name, verifier = self.verifier.name(), "advisory unavailable");
        }

        RowOutcome::Success(ProductMatch {
            code: code.to_string(),
            name: name.to_string(),
            category_path: decision.category_path,
            matched_id: decision.matched_id,
            confidence_label: decision.confidence_label,
            advisory_text: advisory.into_text(),
            decision: decision.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{Advisory, DisabledVerifier};
    use crate::models::{CatalogEntry, DecisionKind, SKIP_LABEL};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Encoder backed by a fixed text → vector table.
    struct TableEncoder {
        table: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl Encoder for TableEncoder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    self.table
                        .get(t)
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("no vector for '{}'", t))
                })
                .collect()
        }
    }

    struct RecordingVerifier {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Verifier for RecordingVerifier {
        fn name(&self) -> &str {
            "recording"
        }
        async fn verify(&self, _system: &str, prompt: &str) -> Advisory {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Advisory::Response("category: Генераторы\nКомментарий: 99".to_string())
        }
    }

    fn generator_catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(vec![CatalogEntry {
                id: "1001".to_string(),
                name: "Генератор бензиновый".to_string(),
                category_path: "Генераторы>Бензиновые".to_string(),
                embedding: vec![1.0, 0.05],
            }])
            .unwrap(),
        )
    }

    fn encoder(pairs: &[(&str, Vec<f32>)]) -> Arc<dyn Encoder> {
        Arc::new(TableEncoder {
            table: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        })
    }

    #[tokio::test]
    async fn accepts_near_identical_embedding() {
        let verifier = Arc::new(RecordingVerifier {
            prompts: Mutex::new(Vec::new()),
        });
        let matcher = Matcher::new(
            generator_catalog(),
            encoder(&[("Генератор бензиновый 2.5 кВт", vec![1.0, 0.0])]),
            verifier.clone(),
            MatcherParams::default(),
        );
        let outcome = matcher
            .match_product(&ProductQuery::new("Генератор бензиновый 2.5 кВт", "G-25"))
            .await;
        let m = outcome.as_match().expect("success");
        assert_eq!(m.category_path, "Генераторы>Бензиновые");
        assert_eq!(m.matched_id, "1001");
        assert_eq!(m.decision, DecisionKind::Accepted);
        let pct: f32 = m.confidence_label.parse().unwrap();
        assert!(pct >= 85.0);
        assert!(m.advisory_text.as_deref().unwrap().contains("Генераторы"));

        let prompts = verifier.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("category!: Бензиновые"));
    }

    #[tokio::test]
    async fn empty_name_is_row_error() {
        let matcher = Matcher::new(
            generator_catalog(),
            encoder(&[]),
            Arc::new(DisabledVerifier),
            MatcherParams::default(),
        );
        let outcome = matcher.match_product(&ProductQuery::new("   ", "X")).await;
        match outcome {
            RowOutcome::Error(f) => {
                assert_eq!(f.code, "X");
                assert_eq!(f.message, "product name must not be empty");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn encoding_failure_is_row_error() {
        let matcher = Matcher::new(
            generator_catalog(),
            encoder(&[]),
            Arc::new(DisabledVerifier),
            MatcherParams::default(),
        );
        let outcome = matcher.match_product(&ProductQuery::new("Мотоблок", "")).await;
        match outcome {
            RowOutcome::Error(f) => assert!(f.message.starts_with("failed to encode")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dimension_mismatch_is_row_error() {
        let matcher = Matcher::new(
            generator_catalog(),
            encoder(&[("Мотоблок", vec![1.0, 0.0, 0.0])]),
            Arc::new(DisabledVerifier),
            MatcherParams::default(),
        );
        let err = matcher.evaluate("Мотоблок").await.unwrap_err();
        assert!(matches!(
            err,
            RowError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn empty_catalog_always_skips() {
        let matcher = Matcher::new(
            Arc::new(Catalog::empty()),
            encoder(&[]),
            Arc::new(DisabledVerifier),
            MatcherParams::default(),
        );
        for name in ["Генератор", "Свеча зажигания NGK", "x"] {
            let outcome = matcher.match_product(&ProductQuery::new(name, "")).await;
            let m = outcome.as_match().expect("success");
            assert_eq!(m.category_path, "");
            assert_eq!(m.confidence_label, SKIP_LABEL);
            assert_eq!(m.decision, DecisionKind::Skipped);
            assert_eq!(m.advisory_text, None);
        }
    }
}
