//! Catalog file loading, downloading, and building.
//!
//! A catalog file is JSON Lines. The optional first line is a header that
//! records which embedding model produced the vectors:
//!
//! ```text
//! {"catalog": {"model": "paraphrase-multilingual-minilm-l12-v2", "dims": 384}}
//! {"sku": "1001", "name": "Генератор бензиновый", "category": "Генераторы>Бензиновые", "emb": [0.01, ...]}
//! ```
//!
//! `id`, `category_path`, and `embedding` are accepted as aliases for the
//! entry keys. Blank lines are ignored.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use category_matcher_core::embedding::Encoder;
use category_matcher_core::{Catalog, CatalogEntry};

use crate::config::CatalogConfig;
use crate::spreadsheet::SourceRow;

/// Log download progress every this many bytes.
const PROGRESS_STEP_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
}

#[derive(Deserialize)]
struct HeaderLine {
    catalog: CatalogHeader,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogRecord {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    sku: String,
    #[serde(default)]
    name: String,
    #[serde(alias = "category_path")]
    category: String,
    #[serde(alias = "embedding", default)]
    emb: Vec<f32>,
}

impl From<CatalogRecord> for CatalogEntry {
    fn from(r: CatalogRecord) -> Self {
        CatalogEntry {
            id: r.sku,
            name: r.name,
            category_path: r.category,
            embedding: r.emb,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Parse catalog JSON Lines text.
pub fn parse_catalog(text: &str) -> Result<Catalog> {
    let mut header: Option<CatalogHeader> = None;
    let mut entries = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if entries.is_empty() && header.is_none() {
            if let Ok(h) = serde_json::from_str::<HeaderLine>(line) {
                header = Some(h.catalog);
                continue;
            }
        }
        let record: CatalogRecord = serde_json::from_str(line)
            .with_context(|| format!("Invalid catalog entry on line {}", i + 1))?;
        entries.push(CatalogEntry::from(record));
    }

    let mut catalog = Catalog::new(entries)?;
    if let Some(header) = header {
        if let (Some(declared), Some(actual)) = (header.dims, catalog.dims()) {
            if declared != actual {
                bail!(
                    "Catalog header declares {} dims but entries have {}",
                    declared,
                    actual
                );
            }
        }
        if let Some(model) = header.model {
            catalog = catalog.with_model(model);
        }
    }
    Ok(catalog)
}

/// Read and parse a catalog file.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
    let catalog =
        parse_catalog(&text).with_context(|| format!("Failed to load catalog: {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        entries = catalog.len(),
        dims = ?catalog.dims(),
        model = ?catalog.model(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Load the configured catalog, downloading it first when missing.
///
/// A catalog that is still missing after the download attempt is not fatal:
/// the service starts with an empty catalog and every product is skipped.
pub async fn load_or_fetch(config: &CatalogConfig) -> Result<Catalog> {
    if !config.path.exists() {
        if config.download_url.is_some() {
            if let Err(e) = download_catalog(config).await {
                tracing::error!(error = %format!("{:#}", e), "catalog download failed");
            }
        }
        if !config.path.exists() {
            tracing::warn!(
                path = %config.path.display(),
                "catalog file not found, starting with an empty catalog"
            );
            return Ok(Catalog::empty());
        }
    }
    load_catalog(&config.path)
}

/// Fail unless live queries from `encoder` are comparable with the catalog.
pub fn check_encoder(catalog: &Catalog, encoder: &dyn Encoder) -> Result<()> {
    catalog
        .ensure_compatible(encoder.model_name(), encoder.dims())
        .context("Catalog was built with a different embedding model")?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Download the catalog from `download_url` to `path`.
///
/// The body is streamed to a `.part` file next to the target and renamed
/// once complete. HTML responses (by content type or a body starting with
/// `<`) and bodies smaller than `min_download_bytes` are rejected; the
/// partial file is removed on any failure.
pub async fn download_catalog(config: &CatalogConfig) -> Result<u64> {
    let url = config
        .download_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("catalog.download_url is not configured"))?;

    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let tmp = partial_path(&config.path);
    let result = fetch_to(url, &tmp, config.min_download_bytes).await;
    match result {
        Ok(bytes) => {
            std::fs::rename(&tmp, &config.path).with_context(|| {
                format!("Failed to move download to {}", config.path.display())
            })?;
            tracing::info!(path = %config.path.display(), bytes, "catalog downloaded");
            Ok(bytes)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

async fn fetch_to(url: &str, dest: &Path, min_bytes: u64) -> Result<u64> {
    tracing::info!(url, "downloading catalog");
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to request {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Catalog download failed with HTTP {}", status);
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if content_type.contains("text/html") {
        bail!("Catalog download returned an HTML page instead of a file");
    }
    let total = response.content_length();

    let mut file = std::fs::File::create(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut written = 0u64;
    let mut next_report = PROGRESS_STEP_BYTES;
    let mut sniffed = false;
    while let Some(chunk) = response.chunk().await? {
        if !sniffed {
            if let Some(&first) = chunk.iter().find(|b| !b.is_ascii_whitespace()) {
                if first == b'<' {
                    bail!("Catalog download returned markup instead of JSON Lines");
                }
                sniffed = true;
            }
        }
        file.write_all(&chunk)?;
        written += chunk.len() as u64;
        if written >= next_report {
            tracing::info!(written, total = ?total, "catalog download progress");
            next_report += PROGRESS_STEP_BYTES;
        }
    }
    file.flush()?;

    if written < min_bytes {
        bail!(
            "Downloaded catalog is too small ({} bytes, expected at least {})",
            written,
            min_bytes
        );
    }
    Ok(written)
}

/// Summary of a loaded catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub path: String,
    pub entries: usize,
    pub categories: usize,
    pub dims: Option<usize>,
    pub model: Option<String>,
}

pub fn catalog_stats(path: &Path, catalog: &Catalog) -> CatalogStats {
    CatalogStats {
        path: path.display().to_string(),
        entries: catalog.len(),
        categories: catalog.category_count(),
        dims: catalog.dims(),
        model: catalog.model().map(str::to_string),
    }
}

/// Encode `rows` and write a catalog file with a header naming the encoder.
///
/// Rows without a name or category are skipped with a warning. Returns the
/// number of entries written.
pub async fn build_catalog(
    rows: &[SourceRow],
    encoder: &dyn Encoder,
    batch_size: usize,
    output: &Path,
) -> Result<usize> {
    let usable: Vec<&SourceRow> = rows
        .iter()
        .filter(|r| {
            let ok = !r.name.trim().is_empty() && !r.category.trim().is_empty();
            if !ok {
                tracing::warn!(code = %r.code, name = %r.name, "skipping row without name or category");
            }
            ok
        })
        .collect();
    if usable.is_empty() {
        bail!("No rows with both a name and a category");
    }

    let header = CatalogHeader {
        model: Some(encoder.model_name().to_string()),
        dims: Some(encoder.dims()),
    };
    let mut lines = Vec::with_capacity(usable.len() + 1);
    lines.push(serde_json::to_string(&serde_json::json!({ "catalog": header }))?);

    for (batch_no, batch) in usable.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|r| r.name.trim().to_string()).collect();
        let vectors = encoder
            .encode_batch(&texts)
            .await
            .with_context(|| format!("Failed to encode batch {}", batch_no + 1))?;
        if vectors.len() != batch.len() {
            bail!(
                "Encoder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        for (row, emb) in batch.iter().zip(vectors) {
            let record = CatalogRecord {
                sku: row.code.trim().to_string(),
                name: row.name.trim().to_string(),
                category: row.category.trim().to_string(),
                emb,
            };
            lines.push(serde_json::to_string(&record)?);
        }
        tracing::info!(
            encoded = (batch_no * batch_size.max(1) + batch.len()),
            total = usable.len(),
            "catalog build progress"
        );
    }

    // Validate before replacing anything on disk.
    let text = lines.join("\n") + "\n";
    parse_catalog(&text)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let tmp = partial_path(output);
    std::fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(usable.len())
}
