//! HTTP surface over [`ConversionService`].
//!
//! ```text
//! GET    /healthz          → "OK"
//! POST   /precheck         → CheckOutcome JSON
//! POST   /convert          → converted_images.zip
//! DELETE /tokens/{token}   → 204
//! ```
//!
//! Errors are rendered as `{ "error": ..., "code": ... }` with the status
//! from [`Pdf2ZipError::status_code`](crate::Pdf2ZipError::status_code).

mod error;
pub mod routes;

use crate::service::ConversionService;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Allowance on top of the upload ceiling for the other form fields.
const FORM_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Build the router.
pub fn router(service: Arc<ConversionService>) -> Router {
    let body_limit = service
        .config()
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/precheck", post(routes::precheck))
        .route("/convert", post(routes::convert))
        .route("/tokens/{token}", delete(routes::abort))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve on `addr` until `shutdown` resolves, sweeping expired entries in
/// the background.
pub async fn serve(
    service: Arc<ConversionService>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let reaper = service.spawn_reaper();
    let app = router(service);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("pdf2zip listening on {}", listener.local_addr()?);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    reaper.abort();
    tracing::info!("Server shutdown complete");
    result
}
