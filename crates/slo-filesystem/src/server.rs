//! HTTP endpoint for the reconcile counters.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{FilesystemError, Result};
use crate::metrics::ReconcileMetrics;

/// Content type of the Prometheus text format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Router serving `GET /metrics`.
pub fn metrics_router(metrics: ReconcileMetrics) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(metrics)
}

async fn get_metrics(State(metrics): State<ReconcileMetrics>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], metrics.encode())
}

/// Serves the metrics router on `addr` until `cancel` fires.
///
/// # Errors
///
/// Returns `FilesystemError::Bind` if the address cannot be bound.
pub async fn serve_metrics(
    addr: SocketAddr,
    metrics: ReconcileMetrics,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| FilesystemError::Bind { addr, source })?;
    info!(addr = %addr, "metrics server listening");

    axum::serve(listener, metrics_router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| FilesystemError::Task(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint_encodes_counters() {
        let metrics = ReconcileMetrics::new();
        metrics.inc_reconciles();
        metrics.inc_reconciles();
        metrics.inc_errors();
        let app = metrics_router(metrics);

        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("pyrra_filesystem_reconciles_total 2"));
        assert!(text.contains("pyrra_filesystem_reconciles_errors_total 1"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let app = metrics_router(ReconcileMetrics::new());
        let request = Request::builder()
            .uri("/objectives")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let result = serve_metrics(addr, ReconcileMetrics::new(), CancellationToken::new()).await;
        assert!(matches!(result, Err(FilesystemError::Bind { .. })));
    }
}
