//! Read-only classification statistics and the category snapshot.
//!
//! - GET /stats - classification counts per category, optional time range
//! - GET /labels - the classifier's current category set

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, extract::Query, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::api::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/labels", get(get_labels))
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

async fn get_stats(State(state): State<AppState>, Query(params): Query<StatsParams>) -> Response {
    match state
        .engine
        .journal()
        .stats(params.start_time, params.end_time)
        .await
    {
        Ok(stats) => (StatusCode::OK, Json(json!({ "stats": stats }))).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to compute stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal("failed to compute stats")),
            )
                .into_response()
        }
    }
}

async fn get_labels(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.categories()))
}
