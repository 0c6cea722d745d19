//! Per-message journal operations.
//!
//! - POST /{id}/correction - privileged, set the user's true category
//! - GET /ambiguous - privileged, records whose last recheck was inconclusive

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::Path, extract::State};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::api::{ApiError, authorize};
use mailsift_core::CorrectionError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/correction", post(correct_label))
        .route("/ambiguous", get(list_ambiguous))
}

#[derive(Debug, Deserialize)]
struct CorrectionRequest {
    corrected_category: String,
}

/// Correct the category for one journaled message. The record is added to the
/// training corpus under its new label.
async fn correct_label(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CorrectionRequest>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state
        .engine
        .apply_correction(&id, &request.corrected_category)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": format!(
                    "label corrected to {} and added to training data",
                    request.corrected_category
                ),
            })),
        )
            .into_response(),
        Err(CorrectionError::UnknownCategory(category)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                "invalid_category",
                format!("invalid category: {category}"),
            )),
        )
            .into_response(),
        Err(CorrectionError::UnknownMessage(id)) => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(
                "not_found",
                format!("message record not found: {id}"),
            )),
        )
            .into_response(),
        Err(CorrectionError::Journal(err)) => {
            tracing::error!(error = %err, "failed to apply correction");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal("failed to apply correction")),
            )
                .into_response()
        }
    }
}

async fn list_ambiguous(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.engine.journal().list_ambiguous().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to list ambiguous records");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal("failed to list ambiguous records")),
            )
                .into_response()
        }
    }
}
