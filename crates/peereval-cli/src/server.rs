//! HTTP endpoints for filling in evaluations and downloading reports.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use peereval_core::error::InvalidToken;
use peereval_core::model::{EvaluationForm, Submission};
use peereval_core::report::build_report;
use peereval_core::scoring::{round2, weighted_percentage};
use peereval_core::traits::Summarizer;
use peereval_providers::PeerEvalConfig;
use peereval_report::{workbook_bytes, XLSX_CONTENT_TYPE};
use peereval_store::{Database, StoreError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<PeerEvalConfig>,
    pub summarizer: Arc<dyn Summarizer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/evaluate/:token", get(form_handler).post(submit_handler))
        .route("/rounds/:id/report", get(report_handler))
        .with_state(state)
}

/// Error response with a JSON `{"error": ...}` body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::InvalidToken(InvalidToken::Unknown) => StatusCode::NOT_FOUND,
            StoreError::InvalidToken(InvalidToken::AlreadySubmitted) => StatusCode::CONFLICT,
            StoreError::InvalidToken(InvalidToken::RoundClosed) => StatusCode::GONE,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {e}");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!("request failed: {e:#}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{e:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn form_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<EvaluationForm>, ApiError> {
    Ok(Json(state.db.evaluation_form(&token)?))
}

async fn submit_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(submission): Json<Submission>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.db.submit(&token, &submission)?;
    let score_pct = round2(weighted_percentage(&response.scores));
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Thank you! Your evaluation has been recorded.",
            "score_pct": score_pct,
            "response": response,
        })),
    ))
}

async fn report_handler(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let options = state.config.report.options()?;
    let input = state.db.report_input(round_id)?;
    let report = build_report(&input, state.summarizer.as_ref(), &options).await;
    let bytes = workbook_bytes(&report)?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report.file_name()),
            ),
        ],
        bytes,
    ))
}
