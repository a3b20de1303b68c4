use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/evaluate", post(handlers::submit_job))
        .route("/job/:job_id", get(handlers::get_job_result))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
