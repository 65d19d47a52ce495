//! Route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use ingestion::{IngestOutcome, IngestRequest};
use serde_json::{json, Value};

use crate::{ApiError, AppState};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/health", get(health))
        .route("/build-info", get(build_info))
        .route("/runtime-info", get(runtime_info))
        .with_state(state)
}

/// `POST /ingest`: reconcile the repository with the request body.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
    state.counters.record_received();

    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Rejected ingest body");
        ApiError::from(rejection)
    })?;

    tracing::info!(
        repository = %request.repository,
        branch_suffix = %request.branch_suffix,
        files = request.files.len(),
        "Ingest request received"
    );

    match state.reconciler.reconcile(request).await {
        Ok(outcome) => {
            state.counters.record_success();
            Ok(Json(outcome))
        }
        Err(error) => {
            match error.retry_policy() {
                ingestion::RetryPolicy::Retryable { after } => {
                    tracing::warn!(%error, kind = ?error.kind(), ?after, "Ingest failed (retryable)")
                }
                ingestion::RetryPolicy::NonRetryable => {
                    tracing::error!(%error, kind = ?error.kind(), "Ingest failed")
                }
            }
            Err(error.into())
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn build_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.build_info.clone())
}

pub async fn runtime_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let counters = state.counters();
    Json(json!({
        "deployment_environment": state.environment,
        "num_ingest_requests_received": counters.received,
        "num_ingest_requests_success": counters.succeeded,
        "github_rate_limit": state.rate_limit(),
    }))
}
