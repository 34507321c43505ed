use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use derive_new::new;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{AgentMetadata, ApiResult, ApiSuccess, CoreMetrics};

/// A server that serves `/metrics`, `/api/version` and agent specific routes
#[derive(new, Debug)]
pub struct Server {
    listen_port: u16,
    core_metrics: Arc<CoreMetrics>,
    metadata: AgentMetadata,
}

impl Server {
    /// The full router: base routes merged with `custom`.
    pub fn router(&self, custom: Router) -> Router {
        let core_metrics = self.core_metrics.clone();
        let metadata = self.metadata.clone();
        Router::new()
            .route("/metrics", get(move || Self::gather_metrics(core_metrics)))
            .route("/api/version", get(move || Self::version(metadata)))
            .merge(custom)
    }

    /// Run an HTTP server serving agent-specific different routes until
    /// `shutdown` fires.
    ///
    /// routes:
    ///  - metrics - serving OpenMetrics format reports on `/metrics`
    ///  - version - build information on `/api/version`
    ///  - custom_routes - additional routes to be served by the server as per the specific agent
    pub fn run_with_custom_router(
        self: Arc<Self>,
        router: Router,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let port = self.listen_port;
        info!(port, "starting server on 0.0.0.0");
        let app = self.router(router);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(port, ?err, "Failed to bind admin server");
                    return;
                }
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                error!(?err, "Admin server stopped");
            }
        })
    }

    async fn version(metadata: AgentMetadata) -> ApiResult {
        ApiSuccess::new(metadata)
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format)
    /// report.
    async fn gather_metrics(core_metrics: Arc<CoreMetrics>) -> impl IntoResponse {
        tracing::debug!("Traversing route for /metrics endpoint for serving Prometheus metrics");
        match core_metrics.gather().map(String::from_utf8) {
            Ok(Ok(metrics)) => (StatusCode::OK, metrics),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to gather metrics".into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use prometheus::Registry;
    use tower::ServiceExt;

    use super::*;
    use crate::ApiResponse;

    fn server() -> Server {
        let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
        metrics.running_instances().set(2);
        Server::new(
            0,
            Arc::new(metrics),
            AgentMetadata::new("orchestrator".into(), "0.4.0".into()),
        )
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn serves_metrics() {
        let (status, body) = get(server().router(Router::new()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("hyperion_running_instances"));
    }

    #[tokio::test]
    async fn serves_version_envelope() {
        let (status, body) = get(server().router(Router::new()), "/api/version").await;
        assert_eq!(status, StatusCode::OK);
        let response: ApiResponse = serde_json::from_str(&body).unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()["version"], "0.4.0");
    }
}
