//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, runs the token
//! verifier, and injects the resulting [`DecodedIdentity`] into request
//! extensions. A rejected token short-circuits with 401; the wrapped handler
//! never runs.

use crate::auth::{DecodedIdentity, TokenVerifier};
use crate::errors::AuthError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token verifier (owns the JWKS cache in secure mode).
    pub verifier: Arc<TokenVerifier>,
}

/// Extract Bearer token from the Authorization header.
///
/// A missing header, a non-Bearer scheme, and an empty token are all
/// `MissingToken`.
pub fn extract_bearer_token(req: &Request) -> Result<&str, AuthError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "api.middleware.auth", "Missing Authorization header");
            AuthError::MissingToken
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| {
            tracing::debug!(target: "api.middleware.auth", "Invalid Authorization header format");
            AuthError::MissingToken
        })?;

    if token.is_empty() {
        tracing::debug!(target: "api.middleware.auth", "Empty bearer token");
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

/// Authentication middleware.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if token is missing or rejected
/// - Continues to next handler with `DecodedIdentity` in extensions if accepted
#[instrument(skip_all, name = "api.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let token = extract_bearer_token(&req)?;

    let identity = state.verifier.verify(token).await.into_result()?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Extension trait for extracting the identity from a request.
pub trait IdentityExt {
    /// Get the authenticated identity from request extensions.
    ///
    /// Returns `None` if auth middleware was not applied to this request.
    fn identity(&self) -> Option<&DecodedIdentity>;
}

impl<B> IdentityExt for axum::extract::Request<B> {
    fn identity(&self) -> Option<&DecodedIdentity> {
        self.extensions().get::<DecodedIdentity>()
    }
}
