//! HTTP surface
//!
//! Everything under `/api` passes the rate limiter first and carries the
//! security headers. `/health` does neither.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use crate::server::error::{ApiError, ErrorResponse};
pub use crate::server::middleware::{SECURITY_HEADERS, UNKNOWN_CLIENT, client_key};

mod error;
mod middleware;
pub mod routes;

use crate::config::Config;
use crate::ratelimit::RateLimiter;
use crate::runner::Runner;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            runner: Arc::new(Runner::new(config)),
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{address}': {source}")]
    BindAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/execute", post(routes::execute))
        .route("/execute/mjs", post(routes::execute_esm))
        .route("/execute/cjs", post(routes::execute_cjs))
        .route("/packages", get(routes::packages));

    let api = SECURITY_HEADERS
        .into_iter()
        .fold(api, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(
                name,
                HeaderValue::from_static(value),
            ))
        })
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            middleware::rate_limit,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until interrupted
pub async fn run_server(config: &Config, state: AppState) -> Result<(), ServerError> {
    let address = &config.server.bind_address;
    let addr: SocketAddr = address.parse().map_err(|source| ServerError::BindAddress {
        address: address.clone(),
        source,
    })?;

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, workspace_root = %config.workspace_root.display(), "runjs listening");

    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
