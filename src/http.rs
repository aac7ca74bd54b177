//! HTTP routes for the ingestion service.
//!
//! - `GET /health`: liveness, no dependency checks.
//! - `GET /entries`: every entry, newest first.
//! - `POST /entries`: create an entry from `{name, message}`.
//!
//! The entry routes are also served under `/api/guestbook`.
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::db::StorageError;
use crate::model::Entry;
use crate::service::{CreateError, IngestionService};
use crate::validate::RawSubmission;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestionService>,
}

impl AppState {
    pub fn new(service: IngestionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let entries = get(list_entries).post(create_entry);
    Router::new()
        .route("/health", get(health_check))
        .route("/entries", entries.clone())
        .route("/api/guestbook", entries)
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client-side problem; the message is returned as-is.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CreateError> for ApiError {
    fn from(err: CreateError) -> Self {
        match err {
            CreateError::Rejected(reason) => ApiError::BadRequest(reason.to_string()),
            CreateError::Storage(err) => ApiError::Storage(err),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            // Already logged with context by the service.
            ApiError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
    })
}

async fn list_entries(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

async fn create_entry(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Entry>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let outcome = state
        .service
        .create(&RawSubmission::from_json(&body))
        .await?;
    Ok(Json(outcome.entry))
}
