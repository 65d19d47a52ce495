//! Repo-ingestion HTTP front door.
//!
//! | Route                 | Handler                 | Response                                  |
//! |-----------------------|-------------------------|-------------------------------------------|
//! | `POST /ingest`        | [`routes::ingest`]      | `{"pr_url": ...}` or an error envelope    |
//! | `GET /health`         | [`routes::health`]      | `{"status": "ok"}`                        |
//! | `GET /build-info`     | [`routes::build_info`]  | container build metadata, verbatim        |
//! | `GET /runtime-info`   | [`routes::runtime_info`]| environment, request counters, rate limit |
//!
//! Failures use the envelope `{"error": {"kind": ..., "message": ...}}`; see
//! [`status_for`] for the kind-to-status mapping. Retryable failures carrying
//! a back-off hint also set `Retry-After`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details and request decoding live here. The
//! [`reconciler`] crate sees only a decoded `ingestion::IngestRequest`.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

pub mod error;
pub mod routes;
pub mod state;

pub use error::{status_for, ApiError};
pub use routes::router;
pub use state::{AppState, CounterSnapshot, IngestCounters};

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Listening for ingest requests");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
