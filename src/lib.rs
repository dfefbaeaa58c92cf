//! # Category Matcher
//!
//! Assigns a hierarchical catalog category to free-text product names.
//!
//! The matching logic (candidate filter, similarity ranking, threshold
//! cascade, category chain) lives in `category-matcher-core`. This crate
//! supplies everything around it: configuration, logging, embedding
//! providers, the catalog file format, spreadsheet input, the
//! text-generation cross-check, batch processing, and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ xlsx / JSON │──▶│ Matcher (core)           │──▶│ RowOutcome│
//! │ HTTP / CLI  │   │ filter→rank→cascade→chain│   │  records  │
//! └─────────────┘   └──────┬─────────┬─────────┘   └──────────┘
//!                          │         │
//!                   ┌──────▼───┐ ┌───▼──────┐
//!                   │ Encoder  │ │ Verifier │
//!                   │ fastembed│ │ OpenRouter│
//!                   └──────────┘ └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, environment overrides, validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`embedding`] | Encoder implementations (local, OpenAI, Ollama) |
//! | [`catalog`] | Catalog file loading, downloading, and building |
//! | [`spreadsheet`] | `.xlsx` / JSON product list input |
//! | [`verifier`] | Chat completions cross-check |
//! | [`batch`] | Sequential batch processing |
//! | [`progress`] | Batch progress reporting |
//! | [`app`] | Startup wiring of the matching pipeline |
//! | [`server`] | HTTP API |

pub mod app;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod logging;
pub mod progress;
pub mod server;
pub mod spreadsheet;
pub mod verifier;
