use thiserror::Error;

/// Row-local failures. These mark one row as failed; the batch continues.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("product name must not be empty")]
    EmptyName,

    #[error("failed to encode product name: {reason}")]
    Encoding { reason: String },

    #[error("query embedding has {actual} dimensions, catalog expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Catalog invariant violations, detected while building a [`Catalog`](crate::Catalog).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog entry '{id}' has no embedding")]
    MissingEmbedding { id: String },

    #[error("catalog entry '{id}' has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("catalog was encoded with model '{catalog}' but the encoder is '{encoder}'")]
    ModelMismatch { catalog: String, encoder: String },
}
