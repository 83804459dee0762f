//! HTTP API for triggering, inspecting and searching repository indexes.
//!
//! The caller's identity comes from the `x-user-id` header (set by the
//! authenticating proxy in front of this service).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/index[?repo=owner/repo]` | One job record, or all of the user's |
//! | `POST` | `/api/index` | Start indexing `{"repoFullName"}` (202, or 409 while active) |
//! | `DELETE` | `/api/index?repo=owner/repo` | Delete chunks and record (404 / 409) |
//! | `GET`  | `/api/search?repo=&q=&topK=` | Search one repository's chunks |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "acme/app is already being indexed" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `internal` (500).

use axum::{
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use repo_indexer_core::models::{split_repo_full_name, IndexedRepository};
use repo_indexer_core::vector::SearchHit;

use crate::config::Config;
use crate::state::{AppState, DeleteOutcome};

pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_TOP_K: usize = 10;
const MAX_TOP_K: usize = 100;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/index",
            get(handle_get_index)
                .post(handle_start_index)
                .delete(handle_delete_index),
        )
        .route("/api/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process stops.
pub async fn serve(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");
    println!("Listening on http://{}", config.server.bind);
    serve(state, listener).await
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

pub struct AppError {
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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: format!("{err:#}"),
        }
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn conflict(message: impl Into<String>) -> AppError {
    app_error(StatusCode::CONFLICT, "conflict", message)
}

fn valid_repo(repo: &str) -> Result<&str, AppError> {
    split_repo_full_name(repo)
        .map(|_| repo)
        .ok_or_else(|| bad_request(format!("invalid repository '{repo}', expected owner/repo")))
}

// ============ Caller identity ============

/// The authenticated user, taken from the [`USER_HEADER`] header.
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| {
                app_error(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    format!("missing {USER_HEADER} header"),
                )
            })
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /api/index ============

#[derive(Deserialize)]
struct RepoQuery {
    repo: Option<String>,
}

#[derive(Serialize)]
struct RepositoryList {
    repositories: Vec<IndexedRepository>,
}

async fn handle_get_index(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(query): Query<RepoQuery>,
) -> Result<Response, AppError> {
    match query.repo {
        Some(repo) => {
            let record = state
                .status
                .get_status(&user, valid_repo(&repo)?)
                .await?
                .ok_or_else(|| not_found(format!("{repo} has not been indexed")))?;
            Ok(Json(record).into_response())
        }
        None => {
            let repositories = state.status.list_statuses(&user).await?;
            Ok(Json(RepositoryList { repositories }).into_response())
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartIndexRequest {
    repo_full_name: String,
}

async fn handle_start_index(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(body): Json<StartIndexRequest>,
) -> Result<(StatusCode, Json<IndexedRepository>), AppError> {
    let repo = valid_repo(&body.repo_full_name)?;
    let started = state
        .start_indexing(repo, &user)
        .await?
        .ok_or_else(|| conflict(format!("{repo} is already being indexed")))?;
    info!(repo, user = %user, "indexing accepted");
    Ok((StatusCode::ACCEPTED, Json(started.record)))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
    chunks: usize,
}

async fn handle_delete_index(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(query): Query<RepoQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    let repo = query
        .repo
        .as_deref()
        .ok_or_else(|| bad_request("repo must be provided"))?;
    let repo = valid_repo(repo)?;

    match state.delete_repository(repo, &user).await? {
        DeleteOutcome::Deleted { chunks } => Ok(Json(DeleteResponse {
            deleted: true,
            chunks,
        })),
        DeleteOutcome::NotFound => Err(not_found(format!("{repo} has not been indexed"))),
        DeleteOutcome::Active => Err(conflict(format!("{repo} is being indexed"))),
    }
}

// ============ GET /api/search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    repo: Option<String>,
    q: Option<String>,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let repo = query
        .repo
        .as_deref()
        .ok_or_else(|| bad_request("repo must be provided"))?;
    let repo = valid_repo(repo)?;
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let top_k = query.top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);

    let results = state.search(q, repo, &user, top_k).await?;
    Ok(Json(SearchResponse { results }))
}
