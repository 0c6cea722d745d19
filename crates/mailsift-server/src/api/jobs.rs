//! Job trigger endpoints.
//!
//! - POST /run - run one classification pass now
//! - POST /reclassify - privileged, fire-and-forget bulk re-evaluation

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router, extract::Query, extract::State};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::api::authorize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run", post(run_classification))
        .route("/reclassify", post(trigger_reclassify))
}

#[derive(Debug, Deserialize)]
struct RunParams {
    limit: Option<usize>,
}

/// Trigger the classification job immediately. Returns `skipped` when another
/// job already holds the permit.
async fn run_classification(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20);
    let summary = state.engine.run_ingest(limit).await;
    (StatusCode::OK, Json(summary))
}

#[derive(Debug, Deserialize)]
struct ReclassifyParams {
    limit: Option<usize>,
}

/// Start a bulk reclassification in the background and return immediately.
async fn trigger_reclassify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReclassifyParams>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let limit = params.limit.unwrap_or(100);
    let engine = state.engine.clone();
    tokio::spawn(async move {
        engine.run_reclassify(limit).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "re-classification started in background",
        })),
    )
        .into_response()
}
