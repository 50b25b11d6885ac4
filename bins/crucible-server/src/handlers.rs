// HTTP route handlers for the Crucible server

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use crucible_common::records;
use crucible_common::types::Language;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::orchestrator::PreconditionError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub context_id: String,
    pub language: Language,
    pub source_code: String,
}

/// POST /execute - Run one submission synchronously end-to-end
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> impl IntoResponse {
    let result = state
        .orchestrator
        .execute(&payload.context_id, payload.language, &payload.source_code)
        .await;

    match result {
        Ok(record) => {
            info!(
                context_id = %record.context_id,
                status = %record.status,
                auto_score = record.auto_score,
                "execution served"
            );
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(err) => {
            let status = match &err {
                PreconditionError::ContextNotFound(_) => StatusCode::NOT_FOUND,
                PreconditionError::ContextNotActive(_) => StatusCode::CONFLICT,
                PreconditionError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
                PreconditionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            info!(context_id = %payload.context_id, error = %err, "execution rejected");
            (
                status,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /executions/{context_id}/latest - Most recent record for a context
pub async fn latest_execution(
    State(state): State<Arc<AppState>>,
    Path(context_id): Path<String>,
) -> impl IntoResponse {
    let mut conn = state.redis.clone();
    match records::latest_record(&mut conn, &context_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no executions for context" })),
        )
            .into_response(),
        Err(err) => {
            error!(context_id = %context_id, error = %err, "failed to fetch latest record");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("failed to fetch record: {}", err) })),
            )
                .into_response()
        }
    }
}

/// GET /healthz - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
