//! TOML configuration parsing and validation.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! A handful of environment variables override file values after parsing
//! (see [`Config::apply_env_overrides`]), which keeps container deployments
//! configurable without editing the file.
//!
//! ```toml
//! [catalog]
//! path = "data/catalog.jsonl"
//!
//! [embedding]
//! provider = "local"
//! model = "paraphrase-multilingual-minilm-l12-v2"
//!
//! [matching]
//! thresholds = [0.85, 0.75, 0.65]
//! skip_floor = 0.5
//!
//! [verifier]
//! provider = "openrouter"
//! model = "deepseek/deepseek-chat-v3-0324:free"
//!
//! [server]
//! bind = "0.0.0.0:8000"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use category_matcher_core::cascade::{CascadePolicy, DEFAULT_SKIP_FLOOR, DEFAULT_THRESHOLDS};
use category_matcher_core::filter::{FilterParams, DEFAULT_MIN_CANDIDATES, DEFAULT_TYPE_TOKENS};
use category_matcher_core::pipeline::{MatcherParams, DEFAULT_PROMPT_CANDIDATES};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    /// Fetched when `path` does not exist.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Downloads smaller than this are treated as error pages.
    #[serde(default = "default_min_download_bytes")]
    pub min_download_bytes: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            download_url: None,
            min_download_bytes: default_min_download_bytes(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/catalog.jsonl")
}
fn default_min_download_bytes() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<f32>,
    #[serde(default = "default_skip_floor")]
    pub skip_floor: f32,
    #[serde(default = "default_type_tokens")]
    pub type_tokens: usize,
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
    #[serde(default = "default_prompt_candidates")]
    pub prompt_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            skip_floor: default_skip_floor(),
            type_tokens: default_type_tokens(),
            min_candidates: default_min_candidates(),
            prompt_candidates: default_prompt_candidates(),
        }
    }
}

fn default_thresholds() -> Vec<f32> {
    DEFAULT_THRESHOLDS.to_vec()
}
fn default_skip_floor() -> f32 {
    DEFAULT_SKIP_FLOOR
}
fn default_type_tokens() -> usize {
    DEFAULT_TYPE_TOKENS
}
fn default_min_candidates() -> usize {
    DEFAULT_MIN_CANDIDATES
}
fn default_prompt_candidates() -> usize {
    DEFAULT_PROMPT_CANDIDATES
}

impl MatchingConfig {
    pub fn matcher_params(&self) -> MatcherParams {
        MatcherParams {
            filter: FilterParams {
                type_tokens: self.type_tokens,
                min_candidates: self.min_candidates,
            },
            cascade: CascadePolicy::new(&self.thresholds, self.skip_floor),
            prompt_candidates: self.prompt_candidates,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerifierConfig {
    #[serde(default = "default_verifier_provider")]
    pub provider: String,
    #[serde(default = "default_verifier_url")]
    pub url: String,
    #[serde(default = "default_verifier_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Replaces the built-in system instruction when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_verifier_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            provider: default_verifier_provider(),
            url: default_verifier_url(),
            model: default_verifier_model(),
            api_key_env: default_api_key_env(),
            system_prompt: None,
            timeout_secs: default_verifier_timeout_secs(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

fn default_verifier_provider() -> String {
    "openrouter".to_string()
}
fn default_verifier_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}
fn default_verifier_model() -> String {
    "deepseek/deepseek-chat-v3-0324:free".to_string()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}
fn default_verifier_timeout_secs() -> u64 {
    60
}
fn default_referer() -> String {
    "https://localhost".to_string()
}
fn default_title() -> String {
    "CategoryMatcher".to_string()
}

impl VerifierConfig {
    /// The API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info,category_matcher=debug"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Also write log lines to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Override file values from the process environment.
    ///
    /// | Variable | Overrides |
    /// |----------|-----------|
    /// | `CATALOG_PATH`, `BASE_PKL_PATH` | `catalog.path` |
    /// | `EMBEDDINGS_DOWNLOAD_URL` | `catalog.download_url` |
    /// | `HOST`, `PORT` | `server.bind` |
    /// | `CATMATCH_LOG` | `logging.filter` |
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = get("CATALOG_PATH").or_else(|| get("BASE_PKL_PATH")) {
            self.catalog.path = PathBuf::from(path);
        }
        if let Some(url) = get("EMBEDDINGS_DOWNLOAD_URL") {
            self.catalog.download_url = Some(url);
        }

        let host = get("HOST");
        let port = get("PORT");
        if host.is_some() || port.is_some() {
            let (current_host, current_port) = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(h, p)| (h.to_string(), p.to_string()))
                .unwrap_or_else(|| (self.server.bind.clone(), "8000".to_string()));
            let port = port.unwrap_or(current_port);
            port.parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", port))?;
            self.server.bind = format!("{}:{}", host.unwrap_or(current_host), port);
        }

        if let Some(filter) = get("CATMATCH_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }
}

/// Read, parse, apply environment overrides, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides()?;
    validate(&config)?;
    Ok(config)
}

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/catmatch.toml";

/// Load `path`, or [`DEFAULT_CONFIG_PATH`] if it exists, or built-in defaults.
///
/// Environment overrides and validation apply in every case.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load_config(path);
    }
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return load_config(default_path);
    }
    let mut config = Config::default();
    config.apply_env_overrides()?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    let m = &config.matching;

    if m.thresholds.is_empty() {
        anyhow::bail!("matching.thresholds must not be empty");
    }
    for t in &m.thresholds {
        if !(*t > 0.0 && *t <= 1.0) {
            anyhow::bail!("matching.thresholds must be in (0.0, 1.0], got {}", t);
        }
    }
    if m.thresholds.windows(2).any(|w| w[1] >= w[0]) {
        anyhow::bail!("matching.thresholds must be strictly descending");
    }
    if !(0.0..=1.0).contains(&m.skip_floor) {
        anyhow::bail!("matching.skip_floor must be in [0.0, 1.0]");
    }
    if let Some(lowest) = m.thresholds.last() {
        if m.skip_floor > *lowest {
            anyhow::bail!(
                "matching.skip_floor ({}) must not exceed the lowest threshold ({})",
                m.skip_floor,
                lowest
            );
        }
    }
    if m.type_tokens == 0 {
        anyhow::bail!("matching.type_tokens must be >= 1");
    }
    if m.prompt_candidates == 0 {
        anyhow::bail!("matching.prompt_candidates must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_remote() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    match config.verifier.provider.as_str() {
        "disabled" | "openrouter" => {}
        other => anyhow::bail!(
            "Unknown verifier provider: '{}'. Must be disabled or openrouter.",
            other
        ),
    }
    if config.verifier.timeout_secs == 0 {
        anyhow::bail!("verifier.timeout_secs must be > 0");
    }

    Ok(())
}
