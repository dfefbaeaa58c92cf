//! HTTP API for product categorization.
//!
//! The pipeline is built once at startup and shared by every request.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service name, version, and endpoint list |
//! | `GET`  | `/health` | Health check with model and catalog status |
//! | `GET`  | `/debug` | Encoder, catalog, and verifier details |
//! | `POST` | `/match` | Categorize one product (alias: `/n8n_process`) |
//! | `POST` | `/process` | Categorize every row of an uploaded file |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "product name must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `match_failed` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use category_matcher_core::{Matcher, RowOutcome};

use crate::app::build_matcher;
use crate::batch::process_batch;
use crate::config::Config;
use crate::progress::NoProgress;
use crate::spreadsheet::{read_rows, SourceRow};

/// Largest accepted upload for `POST /process`.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
pub struct AppState {
    pub config: Config,
    pub matcher: Arc<Matcher>,
}

impl AppState {
    pub fn new(config: Config, matcher: Matcher) -> Self {
        Self {
            config,
            matcher: Arc::new(matcher),
        }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let matcher = build_matcher(config).await?;
    let state = Arc::new(AppState::new(config.clone(), matcher));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// All routes with CORS, tracing, and upload limits applied.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/debug", get(handle_debug))
        .route("/match", post(handle_match))
        .route("/n8n_process", post(handle_match))
        .route("/process", post(handle_process))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn match_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "match_failed".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Successful response for `/match` and `/process`.
#[derive(Serialize)]
struct MatchResponse<T: Serialize> {
    status: &'static str,
    data: T,
    processed_items: usize,
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "category-matcher",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "debug": "GET /debug",
            "match": "POST /match",
            "n8n_process": "POST /n8n_process",
            "process": "POST /process"
        }
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Whether an embedding model is configured and loaded.
    model_loaded: bool,
    /// Whether the catalog has at least one entry.
    base_loaded: bool,
    catalog_entries: usize,
    version: &'static str,
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let catalog = state.matcher.catalog();
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.config.embedding.is_enabled(),
        base_loaded: !catalog.is_empty(),
        catalog_entries: catalog.len(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /debug ============

async fn handle_debug(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let matcher = &state.matcher;
    let catalog = matcher.catalog();
    let params = matcher.params();
    let thresholds: Vec<f32> = params.cascade.steps().iter().map(|s| s.threshold).collect();
    Json(serde_json::json!({
        "encoder": {
            "provider": state.config.embedding.provider,
            "model": matcher.encoder().model_name(),
            "dims": matcher.encoder().dims(),
        },
        "catalog": {
            "path": state.config.catalog.path.display().to_string(),
            "entries": catalog.len(),
            "categories": catalog.category_count(),
            "dims": catalog.dims(),
            "model": catalog.model(),
        },
        "matching": {
            "thresholds": thresholds,
            "skip_floor": params.cascade.skip_floor(),
            "type_tokens": params.filter.type_tokens,
            "min_candidates": params.filter.min_candidates,
            "prompt_candidates": params.prompt_candidates,
        },
        "verifier": {
            "provider": matcher.verifier().name(),
            "model": state.config.verifier.model,
            "api_key_set": state.config.verifier.api_key().is_some(),
        },
    }))
}

// ============ POST /match ============

async fn handle_match(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<MatchResponse<RowOutcome>>, AppError> {
    let Json(value) = payload.map_err(|e| bad_request(e.body_text()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| bad_request("request body must be a JSON object"))?;

    let row = SourceRow::from_object(obj);
    if row.name.trim().is_empty() {
        return Err(bad_request("product name must not be empty"));
    }

    match state.matcher.match_product(&row.to_query()).await {
        RowOutcome::Error(failure) => Err(match_failed(failure.message)),
        outcome => Ok(Json(MatchResponse {
            status: "success",
            data: outcome,
            processed_items: 1,
        })),
    }
}

// ============ POST /process ============

async fn handle_process(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<MatchResponse<Vec<RowOutcome>>>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("no file in upload"))?;
    let rows = read_rows(&filename, &bytes).map_err(|e| bad_request(e.to_string()))?;
    let queries: Vec<_> = rows.iter().map(SourceRow::to_query).collect();
    tracing::info!(file = %filename, rows = queries.len(), "processing upload");

    let outcomes = process_batch(&state.matcher, &queries, &NoProgress)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(Json(MatchResponse {
        status: "success",
        processed_items: outcomes.len(),
        data: outcomes,
    }))
}
