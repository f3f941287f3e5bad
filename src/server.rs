//! HTTP server.
//!
//! Exposes the [`Recall`] service as a JSON API for capture surfaces
//! (browser extensions, scrapers) and question-answering clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/items` | Analyze and/or store one item |
//! | `POST` | `/api/query` | Widening retrieval plus optional summary |
//! | `GET`  | `/api/stats` | Item count and vector length |
//! | `GET`  | `/api/health` | Liveness and version |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "error": { "code": "validation", "message": "text must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `validation` | 400 |
//! | `dimension_mismatch` | 500 |
//! | `provider_unavailable` | 503 (504 on timeout) |
//! | `provider_rejected` | 502 |
//!
//! An empty query result is not an error; it is a `200` with no items.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-hosted
//! capture surfaces can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use recall_core::RecallError;

use crate::config::Config;
use crate::service::{QueryRequest, QueryResponse, Recall, StatsResponse, SubmitRequest, SubmitResponse};

/// Build the router around a shared service.
pub fn router(recall: Arc<Recall>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/items", post(handle_submit))
        .route("/api/query", post(handle_query))
        .route("/api/stats", get(handle_stats))
        .route("/api/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(recall)
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let recall = Arc::new(Recall::from_config(config)?);
    let app = router(recall);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "recall server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RecallError> for AppError {
    fn from(err: RecallError) -> Self {
        let message = err.to_string();
        let status = match &err {
            RecallError::Validation(_) => StatusCode::BAD_REQUEST,
            RecallError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            RecallError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecallError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
            // The query handler answers empty results with a 200 success body,
            // so reaching this arm means a handler leaked it.
            RecallError::EmptyResult => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = err.code(), %message, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "validation".to_string(),
            message: rejection.body_text(),
        }
    }
}

// ============ Handlers ============

async fn handle_submit(
    State(recall): State<Arc<Recall>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, AppError> {
    let Json(req) = body?;
    Ok(Json(recall.submit(req).await?))
}

async fn handle_query(
    State(recall): State<Arc<Recall>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body?;
    Ok(Json(recall.query(req).await?))
}

async fn handle_stats(State(recall): State<Arc<Recall>>) -> Result<Json<StatsResponse>, AppError> {
    Ok(Json(recall.stats().await?))
}

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    message: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Server is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
