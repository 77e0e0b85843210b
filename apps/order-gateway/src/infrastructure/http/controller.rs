//! HTTP Controller (Driver Adapter)
//!
//! Axum-based REST API that delegates to the submission use case.
//!
//! Status mapping for `POST /api/v1/orders/submit`: 200 when every order
//! was submitted, 207 when the batch was attempted with mixed or all-failed
//! results, 400 for an empty id list, 413 for an oversized one, 503 with a
//! `Retry-After` header while load is being shed.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use tracing::warn;

use crate::application::ports::{OrderStorePort, ReconciliationPort, TradeServicePort};
use crate::application::use_cases::{SubmitBatchUseCase, SubmitRejection};
use crate::domain::{BatchSubmitResponse, SubmissionOutcome};
use crate::resilience::{AdmissionController, OverloadDetector};

use super::request::SubmitBatchRequest;
use super::response::{HealthResponse, OverloadStatusResponse};

/// Application state shared across handlers.
pub struct AppState<S, T, R>
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    /// Use case for batch submission.
    pub submit_batch: Arc<SubmitBatchUseCase<S, T, R>>,
    /// Overload detector, exposed read-only for status queries.
    pub detector: Arc<OverloadDetector>,
    /// Admission gate, exposed read-only for status queries.
    pub admission: Arc<AdmissionController>,
    /// Application version.
    pub version: String,
}

impl<S, T, R> Clone for AppState<S, T, R>
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    fn clone(&self) -> Self {
        Self {
            submit_batch: Arc::clone(&self.submit_batch),
            detector: Arc::clone(&self.detector),
            admission: Arc::clone(&self.admission),
            version: self.version.clone(),
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router<S, T, R>(state: AppState<S, T, R>) -> Router
where
    S: OrderStorePort + 'static,
    T: TradeServicePort + 'static,
    R: ReconciliationPort + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/orders/submit", post(submit_batch))
        .route("/api/v1/overload", get(overload_status))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check<S, T, R>(State(state): State<AppState<S, T, R>>) -> impl IntoResponse
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
    })
}

/// Batch submission endpoint.
async fn submit_batch<S, T, R>(
    State(state): State<AppState<S, T, R>>,
    Json(request): Json<SubmitBatchRequest>,
) -> axum::response::Response
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    match state.submit_batch.execute(&request.order_ids).await {
        Ok(response) => {
            let status = if response.outcome == SubmissionOutcome::Success {
                StatusCode::OK
            } else {
                StatusCode::MULTI_STATUS
            };
            (status, Json(response)).into_response()
        }
        Err(SubmitRejection::InvalidRequest { reason, oversized }) => {
            warn!(reason, "batch submission rejected");
            let status = if oversized {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(BatchSubmitResponse::validation_failure())).into_response()
        }
        Err(SubmitRejection::Overloaded { retry_after }) => {
            let seconds = retry_after.as_secs().max(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, seconds.to_string())],
                Json(BatchSubmitResponse::validation_failure()),
            )
                .into_response()
        }
    }
}

/// Overload and backpressure status endpoint.
async fn overload_status<S, T, R>(State(state): State<AppState<S, T, R>>) -> impl IntoResponse
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    let metrics = state.detector.metrics();
    Json(OverloadStatusResponse {
        state: metrics.state,
        consecutive_failures: metrics.consecutive_failures,
        state_transitions: metrics.state_transitions,
        rejected_batches: metrics.rejected_batches,
        pool_utilization: state.admission.utilization(),
        pool_capacity: state.admission.capacity(),
        pool_available: state.admission.available(),
    })
}
