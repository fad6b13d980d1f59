//! Intake Server - HTTP boundary for the application intake pipeline
//!
//! Routes:
//! - `POST /v1/applications` starts an application and returns its session token
//! - `POST /v1/applications/update` applies one wizard step
//! - `POST /v1/applications/finalize` records consent and completes the record
//! - `POST /v1/applications/notify` queues the broker confirmation
//! - `GET /healthz`
//!
//! # Example
//!
//! ```rust,ignore
//! use intake_server::{request_timeout, router, serve, AppState};
//!
//! let config = IntakeConfig::load("intake.toml")?.with_env_secrets();
//! let state = AppState::new(IntakeService::from_config(&config).await?);
//! let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
//! serve(listener, router(state, request_timeout(&config))).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod routes;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use intake_core::{IntakeConfig, IntakeService};
use std::time::Duration;
use tokio::net::TcpListener;

pub use error::{ApiError, ErrorBody};

/// Requests cut off by the timeout layer
pub const REQUEST_TIMEOUTS: &str = "intake_request_timeouts_total";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: IntakeService,
}

impl AppState {
    #[must_use]
    pub fn new(service: IntakeService) -> Self {
        Self { service }
    }
}

/// Per-request timeout from configuration
#[must_use]
pub fn request_timeout(config: &IntakeConfig) -> Duration {
    Duration::from_millis(config.request_timeout_ms)
}

/// Build the router
pub fn router(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route("/v1/applications", post(routes::create))
        .route("/v1/applications/update", post(routes::update))
        .route("/v1/applications/finalize", post(routes::finalize))
        .route("/v1/applications/notify", post(routes::notify))
        .route("/healthz", get(routes::healthz))
        .layer(middleware::from_fn_with_state(timeout, enforce_timeout))
        .with_state(state)
}

async fn enforce_timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => {
            tracing::debug!(%method, %path, status = response.status().as_u16(), "request served");
            response
        }
        Err(_) => {
            tracing::warn!(%method, %path, timeout_ms = limit.as_millis(), "request timed out");
            metrics::counter!(REQUEST_TIMEOUTS, "path" => path).increment(1);
            ApiError::Timeout.into_response()
        }
    }
}

/// Serve until the listener fails or ctrl-c
///
/// # Errors
/// Returns the I/O error that stopped the server
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "intake server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
