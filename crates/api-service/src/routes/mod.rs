//! HTTP routes for the API service.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout applied to every route.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Token verifier shared by the auth gate and `/api/auth/verify`.
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Build state with a verifier derived from `config`.
    pub fn new(config: Config) -> Self {
        let verifier = Arc::new(TokenVerifier::from_config(&config.auth));
        Self { config, verifier }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/auth/config` - Public auth configuration
/// - `/api/auth/verify` - Verify a token from the request body - public
/// - `/api/auth/status` - Caller's claims - requires authentication
/// - `/api/auth/me` - Caller's profile - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        verifier: Arc::clone(&state.verifier),
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/auth/config", get(handlers::get_auth_config))
        .route("/api/auth/verify", post(handlers::verify_token))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/api/auth/status", get(handlers::get_auth_status))
        .route("/api/auth/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Layer order (each .layer wraps everything added before it):
    // 1. TraceLayer - Log request details (innermost)
    // 2. TimeoutLayer - Bound the traced request at 30s
    // 3. http_metrics_middleware - Record ALL responses, timeouts included (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}
