use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;

/// Content type of the Prometheus text exposition format.
const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

async fn export_metrics(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            log::error!("{}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn index() -> Redirect {
    Redirect::to("/metrics")
}

/// HTTP endpoint exposing the registry to Prometheus.
pub struct MetricsServer {
    router: axum::Router,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let router = axum::Router::new()
            .route("/", get(index))
            .route("/metrics", get(export_metrics))
            .route("/health", get(health))
            .with_state(metrics);
        Self { router }
    }

    /// Binds to `addr` and serves until `token` is cancelled.
    pub async fn listen(self, addr: SocketAddr, token: CancellationToken) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| crate::Error::Bind {
                address: addr,
                source,
            })?;
        log::info!("Serving metrics on http://{}/metrics", addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(crate::Error::Serve)
    }
}
