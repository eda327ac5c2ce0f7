//! Axum-based scrape endpoint.
//!
//! `GET /metrics` renders the [`MetricSurface`] on every request. The handler
//! holds no state of its own; whatever the periodic tasks last wrote is what
//! the scraper sees.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug_span, info, warn};

use crate::{MetricSurface, MetricsError};

/// HTTP server exposing a [`MetricSurface`].
pub struct MetricsServer {
    listener: TcpListener,
    surface: Arc<MetricSurface>,
}

impl MetricsServer {
    /// Bind the listening socket. Binding happens before serving so that
    /// startup fails fast on an unusable address.
    pub async fn bind(addr: &str, surface: Arc<MetricSurface>) -> Result<Self, MetricsError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, surface })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, MetricsError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(surface: Arc<MetricSurface>) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(surface)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), MetricsError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("metrics are exposed on http://{addr}/metrics");
        let app = Self::router(self.surface);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn index_handler() -> &'static str {
    "Casper validator exporter. Metrics are served at /metrics\n"
}

async fn metrics_handler(State(surface): State<Arc<MetricSurface>>) -> Response {
    let _span = debug_span!("scrape").entered();
    match surface.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!("failed to render metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
