//! Admission middleware.
//!
//! Picks an identity and a limit for each request, asks the rate limiter,
//! and either forwards the request or answers `429 Too Many Requests`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, instrument, trace, warn};

use crate::ratelimit::{RateLimiter, RouteLimits};

/// Header carrying an explicit caller identity.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Identity used when neither the header nor the peer address is known.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Shared state of the admission middleware.
#[derive(Clone)]
pub struct AdmissionState {
    /// The rate limiter instance
    limiter: Arc<dyn RateLimiter>,
    /// Limit selection per path
    limits: Arc<RouteLimits>,
    /// Forward requests when the limiter fails
    fail_open: bool,
}

impl AdmissionState {
    pub fn new(limiter: Arc<dyn RateLimiter>, limits: RouteLimits, fail_open: bool) -> Self {
        Self {
            limiter,
            limits: Arc::new(limits),
            fail_open,
        }
    }
}

/// The rate limit key for a request.
///
/// The `X-User-ID` header wins when present and non-empty; otherwise the
/// peer IP address is used.
pub fn extract_identity(req: &Request) -> String {
    let header = req
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(identity) = header {
        return identity.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

/// Rate limit a request before it reaches the handler.
#[instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn admission(State(state): State<AdmissionState>, req: Request, next: Next) -> Response {
    let identity = extract_identity(&req);
    let limit = state.limits.limit_for(req.uri().path());

    match state.limiter.allow(&identity, limit).await {
        Ok(true) => {
            trace!(identity = %identity, limit = limit, "Request admitted");
            next.run(req).await
        }
        Ok(false) => {
            debug!(identity = %identity, limit = limit, "Request rejected");
            (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response()
        }
        Err(err) if state.fail_open => {
            warn!(identity = %identity, error = %err, "Rate limit error, admitting request");
            next.run(req).await
        }
        Err(err) => {
            warn!(identity = %identity, error = %err, "Rate limit error, rejecting request");
            (StatusCode::SERVICE_UNAVAILABLE, "Rate Limit Unavailable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request() -> axum::http::request::Builder {
        Request::builder().uri("/api/resource")
    }

    #[test]
    fn test_header_identity_preferred() {
        let mut req = request()
            .header("X-User-ID", "alice")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        assert_eq!(extract_identity(&req), "alice");
    }

    #[test]
    fn test_peer_ip_fallback_drops_port() {
        let mut req = request().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 53122))));

        assert_eq!(extract_identity(&req), "192.168.1.7");
    }

    #[test]
    fn test_blank_header_falls_back() {
        let mut req = request().header("X-User-ID", "  ").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("[::1]:8080".parse::<SocketAddr>().unwrap()));

        assert_eq!(extract_identity(&req), "::1");
    }

    #[test]
    fn test_unknown_without_peer() {
        let req = request().body(Body::empty()).unwrap();
        assert_eq!(extract_identity(&req), UNKNOWN_IDENTITY);
    }
}
