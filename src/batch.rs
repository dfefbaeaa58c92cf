//! Sequential batch categorization.
//!
//! Rows are matched one at a time, in input order. A row that fails (empty
//! name, encoder error) produces an error record and the batch continues.
//! Dropping the returned future between rows stops the batch; rows already
//! completed are not reported.

use anyhow::{bail, Result};

use category_matcher_core::{Matcher, ProductQuery, RowOutcome};

use crate::progress::{BatchProgressEvent, BatchProgressReporter};

/// Categorize every row, returning exactly one outcome per row.
pub async fn process_batch(
    matcher: &Matcher,
    rows: &[ProductQuery],
    reporter: &dyn BatchProgressReporter,
) -> Result<Vec<RowOutcome>> {
    if rows.is_empty() {
        bail!("no rows to process");
    }

    let total = rows.len() as u64;
    reporter.report(BatchProgressEvent::Started { total });
    tracing::info!(rows = total, "batch started");

    let mut outcomes = Vec::with_capacity(rows.len());
    let mut failed = 0u64;
    for (i, row) in rows.iter().enumerate() {
        let outcome = matcher.match_product(row).await;
        let success = outcome.is_success();
        if !success {
            failed += 1;
        }
        reporter.report(BatchProgressEvent::Row {
            n: i as u64 + 1,
            total,
            success,
        });
        outcomes.push(outcome);
    }

    reporter.report(BatchProgressEvent::Finished { total, failed });
    tracing::info!(rows = total, failed, "batch finished");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use category_matcher_core::advisory::DisabledVerifier;
    use category_matcher_core::embedding::Encoder;
    use category_matcher_core::{Catalog, CatalogEntry, MatcherParams};
    use std::sync::{Arc, Mutex};

    struct ConstEncoder;

    #[async_trait]
    impl Encoder for ConstEncoder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct Recording(Mutex<Vec<String>>);

    impl BatchProgressReporter for Recording {
        fn report(&self, event: BatchProgressEvent) {
            self.0.lock().unwrap().push(format!("{:?}", event));
        }
    }

    fn matcher() -> Matcher {
        let catalog = Catalog::new(vec![CatalogEntry {
            id: "1".to_string(),
            name: "Генератор".to_string(),
            category_path: "Генераторы".to_string(),
            embedding: vec![1.0, 0.0],
        }])
        .unwrap();
        Matcher::new(
            Arc::new(catalog),
            Arc::new(ConstEncoder),
            Arc::new(DisabledVerifier),
            MatcherParams::default(),
        )
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let err = process_batch(&matcher(), &[], &NoProgress).await.unwrap_err();
        assert_eq!(err.to_string(), "no rows to process");
    }

    #[tokio::test]
    async fn one_outcome_per_row_in_order() {
        let rows = vec![
            ProductQuery::new("Генератор 1", "a"),
            ProductQuery::new("", "b"),
            ProductQuery::new("Генератор 3", "c"),
        ];
        let reporter = Recording(Mutex::new(Vec::new()));
        let outcomes = process_batch(&matcher(), &rows, &reporter).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_match().unwrap().code, "a");
        assert!(matches!(&outcomes[1], RowOutcome::Error(f) if f.code == "b"));
        assert_eq!(outcomes[2].as_match().unwrap().code, "c");

        let events = reporter.0.lock().unwrap();
        assert_eq!(events.len(), 5);
        assert!(events[4].contains("failed: 1"));
    }
}
