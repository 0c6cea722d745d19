//! Notification endpoints over the journal's unread bit.
//!
//! - GET / - unread records
//! - POST /ack - mark records read; empty or missing ids means all
//! - POST /pop - fetch unread and acknowledge them in one call
//! - GET /read - already-read records in a required time range

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::Query, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::api::ApiError;
use mailsift_core::MessageRecord;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_unread))
        .route("/ack", post(ack))
        .route("/pop", post(pop))
        .route("/read", get(list_read))
}

#[derive(Debug, Serialize)]
struct Notification {
    id: String,
    timestamp: DateTime<Utc>,
    sender: Option<String>,
    recipient: Option<String>,
    subject: Option<String>,
    predicted_category: String,
    confidence_score: f64,
    is_read: bool,
}

impl From<MessageRecord> for Notification {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.received_at,
            sender: record.sender,
            recipient: record.recipient,
            subject: record.subject,
            predicted_category: record.predicted_category,
            confidence_score: record.confidence,
            is_read: record.is_read,
        }
    }
}

fn to_notifications(records: Vec<MessageRecord>) -> Vec<Notification> {
    records.into_iter().map(Notification::from).collect()
}

fn storage_error(context: &str, err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::internal(context.to_string())),
    )
        .into_response()
}

async fn list_unread(State(state): State<AppState>) -> Response {
    match state.engine.journal().unread().await {
        Ok(records) => (StatusCode::OK, Json(to_notifications(records))).into_response(),
        Err(err) => storage_error("failed to list notifications", err),
    }
}

#[derive(Debug, Deserialize)]
struct AckRequest {
    #[serde(default)]
    ids: Option<Vec<String>>,
}

async fn ack(State(state): State<AppState>, Json(request): Json<AckRequest>) -> Response {
    // An empty list means the same as no list: acknowledge everything.
    let ids = request.ids.filter(|ids| !ids.is_empty());
    match state.engine.journal().ack(ids.as_deref()).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "success"}))).into_response(),
        Err(err) => storage_error("failed to acknowledge notifications", err),
    }
}

async fn pop(State(state): State<AppState>) -> Response {
    match state.engine.journal().pop_unread().await {
        Ok(records) => (StatusCode::OK, Json(to_notifications(records))).into_response(),
        Err(err) => storage_error("failed to pop notifications", err),
    }
}

#[derive(Debug, Deserialize)]
struct ReadRangeParams {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

async fn list_read(
    State(state): State<AppState>,
    Query(params): Query<ReadRangeParams>,
) -> Response {
    match state
        .engine
        .journal()
        .read_in_range(params.start_time, params.end_time)
        .await
    {
        Ok(records) => (StatusCode::OK, Json(to_notifications(records))).into_response(),
        Err(err) => storage_error("failed to list read notifications", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testutil::{sample_record, test_state};
    use axum::body::to_bytes;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn unread_then_ack_specific_ids() {
        let dir = TempDir::new().expect("temp dir");
        let state = test_state(&dir).await;
        let journal = state.engine.journal();
        journal
            .upsert(sample_record("m1", "FOCUS"))
            .await
            .expect("seed");
        journal
            .upsert(sample_record("m2", "NOISE"))
            .await
            .expect("seed");

        let response = list_unread(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().expect("array").len(), 2);

        let response = ack(
            State(state.clone()),
            Json(AckRequest {
                ids: Some(vec!["m1".to_string()]),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(list_unread(State(state)).await).await;
        assert_eq!(body.as_array().expect("array").len(), 1);
        assert_eq!(body[0]["id"], "m2");
    }

    #[tokio::test]
    async fn ack_with_empty_ids_acknowledges_everything() {
        let dir = TempDir::new().expect("temp dir");
        let state = test_state(&dir).await;
        let journal = state.engine.journal();
        journal
            .upsert(sample_record("m1", "FOCUS"))
            .await
            .expect("seed");
        journal
            .upsert(sample_record("m2", "NOISE"))
            .await
            .expect("seed");

        ack(State(state.clone()), Json(AckRequest { ids: Some(vec![]) })).await;

        let body = body_json(list_unread(State(state)).await).await;
        assert!(body.as_array().expect("array").is_empty());
    }

    #[tokio::test]
    async fn pop_returns_and_acknowledges() {
        let dir = TempDir::new().expect("temp dir");
        let state = test_state(&dir).await;
        state
            .engine
            .journal()
            .upsert(sample_record("m1", "FOCUS"))
            .await
            .expect("seed");

        let body = body_json(pop(State(state.clone())).await).await;
        assert_eq!(body.as_array().expect("array").len(), 1);
        assert_eq!(body[0]["predicted_category"], "FOCUS");

        let body = body_json(list_unread(State(state)).await).await;
        assert!(body.as_array().expect("array").is_empty());
    }

    #[tokio::test]
    async fn read_range_returns_acknowledged_records() {
        let dir = TempDir::new().expect("temp dir");
        let state = test_state(&dir).await;
        state
            .engine
            .journal()
            .upsert(sample_record("m1", "FOCUS"))
            .await
            .expect("seed");
        state.engine.journal().ack(None).await.expect("ack");

        let now = Utc::now();
        let response = list_read(
            State(state),
            Query(ReadRangeParams {
                start_time: now - Duration::hours(1),
                end_time: now + Duration::hours(1),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().expect("array").len(), 1);
        assert_eq!(body[0]["is_read"], true);
    }
}
