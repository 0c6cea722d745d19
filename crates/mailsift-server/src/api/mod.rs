//! HTTP control surface for the classification engine.
//!
//! Endpoints:
//! - job triggers (`/run`, `/reclassify`)
//! - classification stats and the category snapshot
//! - notification reads and acknowledgements
//! - per-message correction and the ambiguous listing
//!
//! Privileged endpoints require the `X-API-Key` header to match the
//! configured admin key; with no key configured they are refused outright.

pub mod jobs;
pub mod notifications;
pub mod records;
pub mod stats;

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Serialize;

use crate::AppState;

/// Create the API router with all endpoints mounted.
pub fn router(_state: AppState) -> Router<AppState> {
    Router::new()
        .merge(jobs::router())
        .merge(stats::router())
        .nest("/notifications", notifications::router())
        .nest("/messages", records::router())
}

/// Error response body shared by all endpoints.
#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
    message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Validate the admin API key for a privileged request.
///
/// Fails closed: an unconfigured key blocks everyone with a 500, a mismatch
/// returns 403.
pub fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        tracing::error!("admin API key is not configured; blocking privileged request");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(
                "configuration_error",
                "admin API key is not configured",
            )),
        )
            .into_response());
    };

    let provided = headers.get("x-api-key").and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::new("forbidden", "could not validate credentials")),
        )
            .into_response());
    }

    Ok(())
}
