//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::exporter::SharedExporter;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    exporter: SharedExporter,
    metrics_path: String,
}

/// Create the HTTP router.
fn create_router(exporter: SharedExporter, metrics_path: &str, timeout: Duration) -> Router {
    let state = AppState {
        exporter,
        metrics_path: metrics_path.to_string(),
    };

    let mut router = Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler));

    if metrics_path != "/" {
        router = router.route("/", get(landing_handler));
    }

    router
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Every request triggers a fresh scrape.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.exporter.render().await;

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.exporter.is_empty() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no domain enabled\n",
        )
            .into_response()
    } else {
        (StatusCode::OK, "ready\n").into_response()
    }
}

async fn landing_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>Couchbase Exporter</title></head>\n<body>\n\
         <h1>Couchbase Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        path = state.metrics_path
    ))
}

/// HTTP server configuration.
pub struct HttpServer {
    exporter: SharedExporter,
    listen_addr: SocketAddr,
    metrics_path: String,
    timeout: Duration,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        exporter: SharedExporter,
        listen_addr: SocketAddr,
        metrics_path: String,
        timeout: Duration,
    ) -> Self {
        Self {
            exporter,
            listen_addr,
            metrics_path,
            timeout,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.exporter, &self.metrics_path, self.timeout);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::StubFetch;
    use crate::exporter::Exporter;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn make_exporter() -> SharedExporter {
        let fetch = StubFetch::new().with(
            "/pools/default",
            r#"{"storageTotals": {"ram": {"total": 2048}}, "nodes": []}"#,
        );
        let config = crate::config::ExporterConfig::parse(
            "{ scrape: { node: false, bucket: false, xdcr: false } }",
        )
        .unwrap();
        Arc::new(Exporter::new(&config, Arc::new(fetch)).unwrap())
    }

    fn empty_exporter() -> SharedExporter {
        Arc::new(Exporter::from_collectors(
            Vec::new(),
            Arc::new(StubFetch::new()),
            "cb",
            BTreeMap::new(),
        ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let router = create_router(make_exporter(), "/metrics", TIMEOUT);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = body_string(response).await;
        assert!(body.contains("cb_cluster_ram_total_bytes 2048"));
        assert!(body.contains("cb_cluster_up 1"));
    }

    #[tokio::test]
    async fn test_each_request_scrapes() {
        let exporter = make_exporter();
        let router = create_router(exporter.clone(), "/metrics", TIMEOUT);

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(exporter.stats().scrapes, 2);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(empty_exporter(), "/metrics", TIMEOUT);

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_endpoint_not_ready() {
        let router = create_router(empty_exporter(), "/metrics", TIMEOUT);

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ready_endpoint_ready() {
        let router = create_router(make_exporter(), "/metrics", TIMEOUT);

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_landing_page() {
        let router = create_router(empty_exporter(), "/couchbase", TIMEOUT);

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("href=\"/couchbase\""));
    }

    #[tokio::test]
    async fn test_run_fails_when_address_in_use() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);

        let server = HttpServer::new(empty_exporter(), addr, "/metrics".to_string(), TIMEOUT);
        let result = tokio::time::timeout(Duration::from_secs(5), server.run(rx))
            .await
            .expect("run should return instead of waiting for shutdown");

        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to bind"), "{}", err);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = create_router(empty_exporter(), "/prometheus/metrics", TIMEOUT);

        let response = router
            .clone()
            .oneshot(
                Request::get("/prometheus/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
