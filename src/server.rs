//! JSON HTTP server.
//!
//! Serves the in-memory content stores and receives GitHub push webhooks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Version and per-pipeline refresh status |
//! | `POST` | `/webhook` | GitHub push webhook |
//! | `GET`  | `/api/{kind}` | All documents, newest first (`?tag=`, `?limit=`) |
//! | `GET`  | `/api/{kind}/recent` | `?n=` newest documents |
//! | `GET`  | `/api/{kind}/oldest` | `?n=` oldest documents, oldest first |
//! | `GET`  | `/api/{kind}/search` | `?q=` term search (`?limit=`, default 10) |
//! | `GET`  | `/api/{kind}/{slug}` | One document |
//!
//! `kind` is `posts` or `cheatsheets`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no posts document with slug 'x'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `webhook_not_configured` (500).

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::{Config, WebhookConfig};
use crate::models::{ContentKind, Document};
use crate::refresh::{ContentPipeline, RefreshStatus};
use crate::site::Site;
use crate::webhook::{WebhookAck, WebhookError, WebhookGateway, SIGNATURE_HEADER};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_COUNT: usize = 5;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub site: Arc<Site>,
    pub webhook: Arc<WebhookGateway>,
}

impl AppState {
    pub fn new(webhook: &WebhookConfig, site: Arc<Site>) -> Self {
        Self {
            webhook: Arc::new(WebhookGateway::new(webhook, site.clone())),
            site,
        }
    }
}

/// Build the router. Separate from [`run_server`] so tests can serve it on
/// an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/webhook", post(handle_webhook))
        .route("/api/{kind}", get(handle_list))
        .route("/api/{kind}/recent", get(handle_recent))
        .route("/api/{kind}/oldest", get(handle_oldest))
        .route("/api/{kind}/search", get(handle_search))
        .route("/api/{kind}/{slug}", get(handle_get))
        .layer(cors)
        .with_state(state)
}

/// Load content and serve until the process is stopped.
///
/// The initial load runs in the background so the server answers `/health`
/// while GitHub is being read.
pub async fn run_server(config: &Config, site: Arc<Site>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(&config.webhook, site.clone());

    tokio::spawn(async move {
        site.refresh_on_startup().await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;

    Ok(())
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        err.log();
        let (status, code) = match &err {
            WebhookError::SecretNotConfigured => {
                (StatusCode::INTERNAL_SERVER_ERROR, "webhook_not_configured")
            }
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            WebhookError::BadPayload(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn pipeline<'a>(state: &'a AppState, kind: &str) -> Result<&'a Arc<ContentPipeline>, AppError> {
    let kind: ContentKind = kind.parse().map_err(|e: anyhow::Error| not_found(e.to_string()))?;
    Ok(state.site.pipeline(kind))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    posts: RefreshStatus,
    cheatsheets: RefreshStatus,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        posts: state.site.posts().status(),
        cheatsheets: state.site.cheatsheets().status(),
    })
}

// ============ POST /webhook ============

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = state.webhook.handle(signature, &body)?;
    Ok(Json(ack))
}

// ============ GET /api/{kind} ============

#[derive(Deserialize)]
struct ListParams {
    tag: Option<String>,
    limit: Option<usize>,
}

async fn handle_list(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Document>>, AppError> {
    let store = pipeline(&state, &kind)?.store();
    let mut docs = match params.tag.as_deref() {
        Some(tag) if !tag.is_empty() => store.get_by_tag(tag),
        _ => store.get_all(),
    };
    if let Some(limit) = params.limit {
        docs.truncate(limit);
    }
    Ok(Json(docs))
}

// ============ GET /api/{kind}/recent, /api/{kind}/oldest ============

#[derive(Deserialize)]
struct CountParams {
    n: Option<usize>,
}

async fn handle_recent(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<CountParams>,
) -> Result<Json<Vec<Document>>, AppError> {
    let store = pipeline(&state, &kind)?.store();
    Ok(Json(store.get_recent(params.n.unwrap_or(DEFAULT_COUNT))))
}

async fn handle_oldest(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<CountParams>,
) -> Result<Json<Vec<Document>>, AppError> {
    let store = pipeline(&state, &kind)?.store();
    Ok(Json(store.get_oldest(params.n.unwrap_or(DEFAULT_COUNT))))
}

// ============ GET /api/{kind}/search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Document>>, AppError> {
    let pipeline = pipeline(&state, &kind)?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if limit == 0 {
        return Err(bad_request("limit must be greater than zero"));
    }

    let mut results = pipeline.search(params.q.as_deref().unwrap_or(""));
    results.truncate(limit);
    Ok(Json(results))
}

// ============ GET /api/{kind}/{slug} ============

async fn handle_get(
    State(state): State<AppState>,
    Path((kind, slug)): Path<(String, String)>,
) -> Result<Json<Document>, AppError> {
    let pipeline = pipeline(&state, &kind)?;
    pipeline
        .store()
        .get_by_slug(&slug)
        .map(Json)
        .ok_or_else(|| not_found(format!("no {} document with slug '{}'", pipeline.kind(), slug)))
}
