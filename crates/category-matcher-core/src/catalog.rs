//! In-memory reference catalog.
//!
//! The [`Catalog`] is built once at startup and only read afterwards; share it
//! behind an `Arc` across requests. Construction enforces that every entry has
//! an embedding and that all embeddings have the same dimensionality.

use std::collections::HashSet;

use crate::error::CatalogError;
use crate::models::CatalogEntry;

/// Read-only table of reference entries, in load order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    dims: Option<usize>,
    model: Option<String>,
}

impl Catalog {
    /// Build a catalog, validating the embedding invariants.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut dims = None;
        for e in &entries {
            if e.embedding.is_empty() {
                return Err(CatalogError::MissingEmbedding { id: e.id.clone() });
            }
            match dims {
                None => dims = Some(e.embedding.len()),
                Some(expected) if expected != e.embedding.len() => {
                    return Err(CatalogError::DimensionMismatch {
                        id: e.id.clone(),
                        expected,
                        actual: e.embedding.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            entries,
            dims,
            model: None,
        })
    }

    /// An empty catalog. Matching against it always yields skip decisions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record which embedding model produced the stored vectors.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimensionality, `None` for an empty catalog.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Number of distinct category paths.
    pub fn category_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.category_path.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Check that live queries from this encoder are comparable with the
    /// stored vectors.
    pub fn ensure_compatible(&self, model_name: &str, dims: usize) -> Result<(), CatalogError> {
        if let Some(model) = &self.model {
            if model != model_name {
                return Err(CatalogError::ModelMismatch {
                    catalog: model.clone(),
                    encoder: model_name.to_string(),
                });
            }
        }
        match self.dims {
            Some(expected) if expected != dims => Err(CatalogError::DimensionMismatch {
                id: "<encoder>".to_string(),
                expected,
                actual: dims,
            }),
            _ => Ok(()),
        }
    }
}
