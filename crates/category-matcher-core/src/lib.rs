//! # Category Matcher Core
//!
//! Pure matching logic for Category Matcher: the reference catalog, lexical
//! candidate narrowing, cosine-similarity ranking, the threshold cascade, and
//! the category chain convention shared with the advisory prompt.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Embedding and the
//! text-generation cross-check are reached through the [`embedding::Encoder`]
//! and [`advisory::Verifier`] traits, implemented by the `category-matcher`
//! app crate.
//!
//! ## Per-product flow
//!
//! ```text
//! name ─▶ filter ─▶ rank ─▶ cascade ─▶ chain ─▶ verifier ─▶ RowOutcome
//! ```

pub mod advisory;
pub mod cascade;
pub mod catalog;
pub mod chain;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod models;
pub mod pipeline;
pub mod rank;

pub use catalog::Catalog;
pub use error::{CatalogError, RowError};
pub use models::{
    CatalogEntry, DecisionKind, MatchDecision, ProductMatch, ProductQuery, RowFailure, RowOutcome,
    ScoredCandidate,
};
pub use pipeline::{Matcher, MatcherParams};
