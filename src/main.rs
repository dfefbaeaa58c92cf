//! # Category Matcher CLI (`catmatch`)
//!
//! Assigns catalog categories to product names, one at a time, in batches
//! from a file, or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! catmatch --config ./config/catmatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catmatch serve` | Start the HTTP server |
//! | `catmatch match "<name>"` | Categorize one product |
//! | `catmatch batch <file>` | Categorize every row of an `.xlsx` / JSON file |
//! | `catmatch catalog fetch` | Download the catalog from `catalog.download_url` |
//! | `catmatch catalog stats` | Show catalog size, model, and dimensions |
//! | `catmatch catalog build <file>` | Encode a product list into a catalog file |
//!
//! ## Examples
//!
//! ```bash
//! # Categorize a single product
//! catmatch match "Генератор бензиновый 2.5 кВт" --code G-25
//!
//! # Categorize a spreadsheet, writing results to a file
//! catmatch batch products.xlsx --output results.json --progress json
//!
//! # Build a catalog from a reference list with the configured encoder
//! catmatch catalog build reference.xlsx --output data/catalog.jsonl
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use category_matcher::app::build_matcher;
use category_matcher::batch::process_batch;
use category_matcher::catalog::{build_catalog, catalog_stats, download_catalog, load_catalog};
use category_matcher::config;
use category_matcher::embedding::create_encoder;
use category_matcher::logging::init_logging;
use category_matcher::progress::ProgressMode;
use category_matcher::server;
use category_matcher::spreadsheet::{read_rows_from_path, SourceRow};
use category_matcher_core::{ProductQuery, RowOutcome};

/// Category Matcher CLI: hierarchical product categorization against a
/// reference catalog.
#[derive(Parser)]
#[command(
    name = "catmatch",
    about = "Category Matcher: assign catalog categories to product names",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/catmatch.toml` when present, otherwise built-in
    /// defaults. Environment overrides apply either way.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Categorize one product name and print the result as JSON.
    Match {
        /// Product name.
        name: String,

        /// Product code (SKU), echoed in the result.
        #[arg(long, default_value = "")]
        code: String,
    },

    /// Categorize every row of an `.xlsx`, `.json`, or `.jsonl` file.
    Batch {
        /// Input file.
        file: PathBuf,

        /// Write results here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Progress on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Manage the reference catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Download the catalog from `catalog.download_url` to `catalog.path`.
    Fetch,

    /// Print entry count, distinct categories, dimensions, and model.
    Stats,

    /// Encode `(sku, name, category)` rows into a catalog file.
    Build {
        /// Input file with name, code, and category columns.
        file: PathBuf,

        /// Output path. Defaults to `catalog.path`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::resolve_config(cli.config.as_deref())?;
    init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Match { name, code } => {
            let matcher = build_matcher(&cfg).await?;
            let outcome = matcher
                .match_product(&ProductQuery::new(name, code))
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let RowOutcome::Error(failure) = outcome {
                anyhow::bail!("{}", failure.message);
            }
        }
        Commands::Batch {
            file,
            output,
            progress,
        } => {
            let mode = match progress.as_deref() {
                Some(value) => ProgressMode::parse(value).with_context(|| {
                    format!("--progress must be off, human, or json, got '{}'", value)
                })?,
                None => ProgressMode::default_for_tty(),
            };
            let rows = read_rows_from_path(&file)?;
            let queries: Vec<ProductQuery> = rows.iter().map(SourceRow::to_query).collect();

            let matcher = build_matcher(&cfg).await?;
            let reporter = mode.reporter();
            let outcomes = process_batch(&matcher, &queries, reporter.as_ref()).await?;

            let json = serde_json::to_string_pretty(&outcomes)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
                    println!(
                        "Wrote {} results ({} failed) to {}",
                        outcomes.len(),
                        failed,
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }
        Commands::Catalog { action } => match action {
            CatalogAction::Fetch => {
                let bytes = download_catalog(&cfg.catalog).await?;
                println!(
                    "Downloaded {} bytes to {}",
                    bytes,
                    cfg.catalog.path.display()
                );
            }
            CatalogAction::Stats => {
                let catalog = load_catalog(&cfg.catalog.path)?;
                let stats = catalog_stats(&cfg.catalog.path, &catalog);
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            CatalogAction::Build { file, output } => {
                let output = output.unwrap_or_else(|| cfg.catalog.path.clone());
                let rows = read_rows_from_path(&file)?;
                let encoder = create_encoder(&cfg.embedding).await?;
                let written =
                    build_catalog(&rows, encoder.as_ref(), cfg.embedding.batch_size, &output)
                        .await?;
                println!("Wrote {} entries to {}", written, output.display());
            }
        },
    }

    Ok(())
}
