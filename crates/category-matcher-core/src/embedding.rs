//! Encoder trait and vector similarity.
//!
//! Defines the [`Encoder`] trait that all embedding backends implement, plus
//! [`cosine_similarity`] used by the ranker.
//!
//! Concrete encoders (fastembed, OpenAI, Ollama) live in the
//! `category-matcher` app crate. Catalog vectors and live query vectors must
//! come from the same encoder; see [`Catalog::ensure_compatible`](crate::Catalog::ensure_compatible).

use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding backends.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector, so similarity scores are reproducible.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the model identifier (e.g. `"paraphrase-multilingual-minilm-l12-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.encode_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
