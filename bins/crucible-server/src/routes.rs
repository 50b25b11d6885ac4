use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute", post(handlers::execute))
        .route(
            "/executions/:context_id/latest",
            get(handlers::latest_execution),
        )
        .route("/healthz", get(handlers::health_check))
}
