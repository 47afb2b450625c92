//! HTTP server implementation.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{admission, AdmissionState};
use crate::error::{Result, WardenError};

/// Path of the rate limited demo resource.
pub const RESOURCE_PATH: &str = "/api/resource";

async fn health_handler() -> &'static str {
    "OK"
}

async fn resource_handler() -> &'static str {
    "Request allowed: Resource accessed"
}

/// Build the application router.
///
/// `/health` is never rate limited; everything behind the admission layer is.
pub fn router(state: AdmissionState) -> Router {
    let limited = Router::new()
        .route(RESOURCE_PATH, get(resource_handler))
        .route_layer(middleware::from_fn_with_state(state, admission));

    Router::new()
        .route("/health", get(health_handler))
        .merge(limited)
}

/// HTTP server fronting the rate limited routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: AdmissionState) -> Self {
        Self {
            addr,
            router: router(state),
        }
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            WardenError::Io(e)
        })
    }
}
