//! Middleware for the API surface
//!
//! - Rate limiting keyed by client address
//! - Security response headers

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::ratelimit::RateLimiter;
use crate::server::error::ApiError;

/// Key shared by every client whose address cannot be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers set on every response of the rate-limited surface
pub const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
];

/// Resolve the rate-limit key for a request.
///
/// The first of `trusted_headers` with a non-empty value wins; for
/// comma-separated values (`x-forwarded-for`) only the first element
/// counts. Then the peer address, then [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>, trusted_headers: &[String]) -> String {
    trusted_headers
        .iter()
        .filter_map(|name| headers.get(name.as_str()))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Admit or reject a request before any other work happens
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let key = client_key(request.headers(), peer, &limiter.config().client_headers);

    let admission = limiter.admit(&key);
    let Some(kind) = admission.error_kind() else {
        return next.run(request).await;
    };

    warn!(
        client = %key,
        %kind,
        reason = ?admission,
        path = %request.uri().path(),
        "request rate limited"
    );
    ApiError::RateLimited {
        retry_after: limiter.window(),
    }
    .into_response()
}
