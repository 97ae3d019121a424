/// REST API routes for maintenance-anchor.
///
/// Handlers are thin: each one calls a single `AnchorService` method and
/// maps `AnchorError` to an HTTP status. Record CRUD lives in the
/// surrounding application; these routes only drive anchoring.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::anchor::AnchorOutcome;
use crate::chain::{ChainService, ChainStats};
use crate::error::AnchorError;
use crate::integrity::{IntegrityReport, IntegritySummary};
use crate::reconcile::{ReconcileOperation, ReconcileReport};
use crate::service::{NetworkHealth, SubmissionOutcome};
use crate::status::diagnostics::NetworkDiagnostics;
use crate::status::ServiceStatus;

/// Error body returned by every failing handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub(crate) fn status_for(e: &AnchorError) -> StatusCode {
    match e {
        AnchorError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        AnchorError::NotResendable(_) | AnchorError::AnchorInFlight(_) => StatusCode::CONFLICT,
        AnchorError::LedgerUnavailable | AnchorError::Connectivity(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AnchorError::SubmissionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AnchorError::ContractRejection(_) | AnchorError::Rpc(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: AnchorError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for(&e),
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ─── Health ──────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ledger: NetworkHealth,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ledger: state.service.get_network_health().await,
    })
}

/// GET /api/diagnostics
async fn diagnostics(State(state): State<Arc<AppState>>) -> Json<NetworkDiagnostics> {
    Json(state.service.diagnose().await)
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/diagnostics", get(diagnostics))
}

// ─── Ledger ──────────────────────────────────────────────

/// GET /api/ledger/stats
async fn ledger_stats(State(state): State<Arc<AppState>>) -> ApiResult<ChainStats> {
    state.service.ledger_stats().await.map(Json).map_err(api_error)
}

/// GET /api/ledger/services/{id}
async fn ledger_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<ChainService> {
    match state.service.ledger_service(id).await {
        Ok(Some(service)) => Ok(Json(service)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no ledger service with id {id}"),
            }),
        )),
        Err(e) => Err(api_error(e)),
    }
}

pub fn ledger_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ledger/stats", get(ledger_stats))
        .route("/api/ledger/services/{id}", get(ledger_service))
}

// ─── Service records ─────────────────────────────────────

/// POST /api/services/{id}/anchor
async fn anchor_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<SubmissionOutcome> {
    Json(state.service.submit_service_to_blockchain(id).await)
}

/// POST /api/services/{id}/resend
async fn resend_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<AnchorOutcome> {
    state.service.resend(id).await.map(Json).map_err(api_error)
}

/// GET /api/services/{id}/status
async fn service_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ServiceStatus> {
    state
        .service
        .get_service_status(id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/services/{id}/integrity
async fn service_integrity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<IntegrityReport> {
    state
        .service
        .verify_service_integrity(id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/integrity
async fn all_integrity(State(state): State<Arc<AppState>>) -> ApiResult<IntegritySummary> {
    state
        .service
        .verify_all_services_integrity()
        .await
        .map(Json)
        .map_err(api_error)
}

pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/services/{id}/anchor", post(anchor_service))
        .route("/api/services/{id}/resend", post(resend_service))
        .route("/api/services/{id}/status", get(service_status))
        .route("/api/services/{id}/integrity", get(service_integrity))
        .route("/api/integrity", get(all_integrity))
}

// ─── Reconciliation ──────────────────────────────────────

/// POST /api/reconcile/{operation}
async fn reconcile(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<ReconcileOperation>,
) -> ApiResult<ReconcileReport> {
    state
        .service
        .reconcile(operation)
        .await
        .map(Json)
        .map_err(api_error)
}

pub fn reconcile_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/reconcile/{operation}", post(reconcile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_mapping() {
        let id = Uuid::now_v7();
        assert_eq!(status_for(&AnchorError::RecordNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AnchorError::AnchorInFlight(id)), StatusCode::CONFLICT);
        assert_eq!(status_for(&AnchorError::NotResendable(id)), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&AnchorError::LedgerUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AnchorError::SubmissionTimeout {
                tx_hash: None,
                after: Duration::from_secs(20)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&AnchorError::Store("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
