// HTTP route handlers for the codejudge API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use codejudge_common::config::HarnessConfig;
use codejudge_common::redis;
use codejudge_common::types::{JobRequest, RawTestSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Upper bound accepted for a per-test timeout
const MAX_TIMEOUT_SECONDS: u64 = 600;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub candidate_source: String,
    pub test_spec: RawTestSpec,
    #[serde(default)]
    pub harness_template: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub early_stop: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Reject submissions the worker would refuse anyway; returns a metric label and a message
pub fn validate(payload: &EvaluateRequest, limits: &HarnessConfig) -> Result<(), (&'static str, String)> {
    if payload.candidate_source.trim().is_empty() {
        return Err(("empty_source", "candidate_source must not be empty".to_string()));
    }
    if payload.candidate_source.len() > limits.max_source_bytes {
        return Err((
            "source_too_large",
            format!("candidate_source exceeds {} bytes", limits.max_source_bytes),
        ));
    }
    match payload.timeout_seconds {
        Some(0) => Err(("bad_timeout", "timeout_seconds must be at least 1".to_string())),
        Some(t) if t > MAX_TIMEOUT_SECONDS => Err((
            "bad_timeout",
            format!("timeout_seconds must be at most {}", MAX_TIMEOUT_SECONDS),
        )),
        _ => Ok(()),
    }
}

/// POST /evaluate - Queue a candidate for evaluation
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluateRequest>,
) -> impl IntoResponse {
    if let Err((reason, message)) = validate(&payload, &state.limits) {
        warn!(reason, "Submission rejected");
        metrics::JOBS_REJECTED.with_label_values(&[reason]).inc();
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response();
    }

    let job_id = Uuid::new_v4();
    let job = JobRequest {
        id: job_id,
        candidate_source: payload.candidate_source,
        test_spec: payload.test_spec,
        harness_template: payload.harness_template,
        timeout_seconds: payload.timeout_seconds,
        debug: payload.debug,
        early_stop: payload.early_stop,
    };

    let mut conn = state.redis.clone();
    match redis::push_job(&mut conn, &state.queue_name, &job).await {
        Ok(_) => {
            metrics::JOBS_SUBMITTED.inc();
            info!(
                job_id = %job_id,
                source_size = job.candidate_source.len(),
                debug = job.debug,
                "Job queued"
            );

            (
                StatusCode::CREATED,
                Json(SubmitResponse {
                    job_id: job_id.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to queue job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to queue job: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// GET /job/{job_id} - Query evaluation result
pub async fn get_job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job_uuid = match Uuid::parse_str(&job_id) {
        Ok(id) => id,
        Err(_) => {
            metrics::RESULTS_SERVED.with_label_values(&["invalid"]).inc();
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid job ID format"
                })),
            )
                .into_response();
        }
    };

    let mut conn = state.redis.clone();
    match redis::get_result(&mut conn, &job_uuid).await {
        Ok(Some(result)) => {
            metrics::RESULTS_SERVED.with_label_values(&["found"]).inc();
            info!(
                job_id = %job_id,
                status = ?result.overall_status,
                passed = result.passed,
                total = result.total,
                "Job result retrieved"
            );
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(None) => {
            metrics::RESULTS_SERVED.with_label_values(&["pending"]).inc();
            // not stored yet: queued, running, or expired
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": "pending",
                    "message": "Job is queued or still executing"
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch job result");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to query job status: {}", e)
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(source: &str, timeout_seconds: Option<u64>) -> EvaluateRequest {
        serde_json::from_value(serde_json::json!({
            "candidate_source": source,
            "test_spec": {"inputs": [[1]], "outputs": [1], "fn_name": "f"},
            "timeout_seconds": timeout_seconds,
        }))
        .unwrap()
    }

    #[test]
    fn test_structured_and_serialized_specs_deserialize() {
        let structured = payload("def f(x): return x", None);
        assert!(matches!(structured.test_spec, RawTestSpec::Structured(_)));

        let serialized: EvaluateRequest = serde_json::from_value(serde_json::json!({
            "candidate_source": "print(1)",
            "test_spec": "{'inputs': [''], 'outputs': ['1']}",
        }))
        .unwrap();
        assert!(matches!(serialized.test_spec, RawTestSpec::Serialized(_)));
        assert!(!serialized.debug);
    }

    #[test]
    fn test_validate() {
        let limits = HarnessConfig::default();
        assert!(validate(&payload("def f(x): return x", Some(5)), &limits).is_ok());
        assert_eq!(validate(&payload("   ", None), &limits).unwrap_err().0, "empty_source");
        assert_eq!(validate(&payload("x = 1", Some(0)), &limits).unwrap_err().0, "bad_timeout");
        assert_eq!(validate(&payload("x = 1", Some(601)), &limits).unwrap_err().0, "bad_timeout");

        let tight = HarnessConfig {
            max_source_bytes: 3,
            ..HarnessConfig::default()
        };
        assert_eq!(validate(&payload("x = 1", None), &tight).unwrap_err().0, "source_too_large");
    }
}
