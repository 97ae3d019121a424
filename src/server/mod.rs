/// HTTP API for maintenance-anchor.
///
/// A thin routing layer over `AnchorService`:
/// - Health and network diagnostics
/// - Ledger reads (stats, registered services)
/// - Per-record anchor, resend, status and integrity
/// - On-demand reconciliation batches
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::service::AnchorService;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnchorService>,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::ledger_routes())
        .merge(routes::service_routes())
        .merge(routes::reconcile_routes())
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(component = "server", %addr, "maintenance-anchor API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
