//! # Trigger-Gate HTTP Service
//!
//! HTTP dispatcher for the Trigger-Gate interceptors.
//!
//! This service provides:
//! - `POST /{interceptor}` dispatching an interceptor request to the named
//!   interceptor under a per-call deadline
//! - `GET /live` and `GET /ready` health checks
//!
//! Interceptor rejections are returned in-band with `200 OK`; only routing,
//! parsing and internal failures produce other status codes.

pub mod config;
pub mod errors;
pub mod interceptor_registry;

pub use config::{LoggingConfig, SecretStoreConfig, SecretsConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, DispatchError, ServiceError, UNKNOWN_INTERCEPTOR_MESSAGE};
pub use interceptor_registry::{InterceptorName, InterceptorRegistry};

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::{future::IntoFuture, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};
use trigger_gate_core::InterceptorRequest;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone, Debug)]
pub struct AppState {
    /// Interceptors reachable by path
    pub registry: Arc<InterceptorRegistry>,

    /// Deadline for a single interceptor call
    pub interceptor_timeout: Duration,

    /// Maximum accepted request body in bytes
    pub max_body_size: usize,
}

impl AppState {
    /// Create new application state
    pub fn new(registry: InterceptorRegistry, config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            interceptor_timeout: Duration::from_secs(config.interceptor_timeout_seconds),
            max_body_size: config.max_body_size,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // A path that exists under another method is answered like an unknown path.
    let health_routes = Router::new()
        .route(
            "/live",
            get(handle_liveness_check).fallback(handle_unmatched_path),
        )
        .route(
            "/ready",
            get(handle_readiness_check).fallback(handle_unmatched_path),
        );

    Router::new()
        .merge(health_routes)
        .route(
            "/{interceptor}",
            post(handle_interceptor).fallback(handle_unmatched_path),
        )
        .fallback(handle_unmatched_path)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(state.max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    registry: InterceptorRegistry,
) -> Result<(), ServiceError> {
    config.validate()?;

    let state = AppState::new(registry, &config.server);
    let app = create_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(address.as_str())
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, interceptors = ?config.interceptors, "Starting HTTP server");

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();

    // In-flight requests are drained after the signal, up to the shutdown timeout.
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Initiating graceful shutdown"
            );
            let _ = signalled_tx.send(());
        })
        .into_future();

    let drain_deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = drain_deadline => {
            warn!("Graceful shutdown timed out; dropping open connections");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Dispatch Handlers
// ============================================================================

/// Dispatch an interceptor request to the interceptor named by the path.
///
/// The interceptor runs under the configured deadline; when it elapses the
/// call is dropped, which also cancels any in-flight secret fetch.
#[instrument(skip_all, fields(interceptor = %interceptor))]
pub async fn handle_interceptor(
    State(state): State<AppState>,
    Path(interceptor): Path<String>,
    body: Bytes,
) -> Result<Response, DispatchError> {
    let Some(handler) = state.registry.resolve_path(&interceptor) else {
        return Err(DispatchError::UnknownInterceptor { path: interceptor });
    };
    let name = interceptor_registry::normalize_path(&interceptor);

    let request: InterceptorRequest =
        serde_json::from_slice(&body).map_err(|e| DispatchError::InvalidRequest {
            message: e.to_string(),
        })?;

    let response = tokio::time::timeout(state.interceptor_timeout, handler.process(&request))
        .await
        .map_err(|_| DispatchError::Timeout {
            interceptor: name.clone(),
            timeout_ms: state.interceptor_timeout.as_millis(),
        })?;

    debug!(
        interceptor = %name,
        event_id = %request.context.event_id,
        continue_processing = response.continue_processing,
        "Interceptor answered"
    );

    let encoded = serde_json::to_vec(&response).map_err(|e| DispatchError::Serialization {
        message: e.to_string(),
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        encoded,
    )
        .into_response())
}

async fn handle_unmatched_path(uri: Uri) -> DispatchError {
    DispatchError::UnknownInterceptor {
        path: uri.path().to_string(),
    }
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness check response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub interceptors: Vec<String>,
}

async fn handle_liveness_check() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

async fn handle_readiness_check(State(state): State<AppState>) -> Json<ReadinessResponse> {
    Json(ReadinessResponse {
        status: "ok",
        interceptors: state.registry.names().into_iter().map(str::to_string).collect(),
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
