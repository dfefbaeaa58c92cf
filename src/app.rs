//! Startup wiring: encoder, catalog, and verifier into one [`Matcher`].

use std::sync::Arc;

use anyhow::Result;

use category_matcher_core::Matcher;

use crate::catalog::{check_encoder, load_or_fetch};
use crate::config::Config;
use crate::embedding::create_encoder;
use crate::verifier::create_verifier;

/// Build the matching pipeline described by `config`.
///
/// The embedding model is loaded and the catalog is read (or downloaded)
/// exactly once here. A catalog built with a different model than the
/// configured encoder is a startup error.
pub async fn build_matcher(config: &Config) -> Result<Matcher> {
    let encoder = create_encoder(&config.embedding).await?;
    tracing::info!(
        provider = %config.embedding.provider,
        model = encoder.model_name(),
        dims = encoder.dims(),
        "encoder ready"
    );

    let catalog = load_or_fetch(&config.catalog).await?;
    if config.embedding.is_enabled() && !catalog.is_empty() {
        check_encoder(&catalog, encoder.as_ref())?;
    }

    let verifier = create_verifier(&config.verifier)?;
    tracing::info!(verifier = verifier.name(), "verifier ready");

    Ok(Matcher::new(
        Arc::new(catalog),
        encoder,
        verifier,
        config.matching.matcher_params(),
    ))
}
