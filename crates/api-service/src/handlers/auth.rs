//! Auth endpoint handlers.
//!
//! - `GET /api/auth/config` - public auth configuration for clients
//! - `POST /api/auth/verify` - verify a token supplied in the body
//! - `GET /api/auth/status` - claims of the caller (gated)
//! - `GET /api/auth/me` - profile fields of the caller (gated)

use crate::auth::{AuthDecision, DecodedIdentity};
use crate::errors::ApiError;
use crate::models::{
    AuthConfigResponse, AuthStatusResponse, MeResponse, VerifyTokenRequest, VerifyTokenResponse,
};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/auth/config
pub async fn get_auth_config(State(state): State<Arc<AppState>>) -> Json<AuthConfigResponse> {
    let auth = &state.config.auth;

    Json(AuthConfigResponse {
        region: auth.region.clone(),
        user_pool_id: auth.user_pool_id.clone(),
        issuer: auth.issuer.clone(),
        jwks_url: auth.jwks_url.clone(),
        requires_secure_jwt: auth.requires_secure_jwt(),
    })
}

/// Handler for POST /api/auth/verify
///
/// The body is parsed leniently: anything that does not yield a non-empty
/// string `token` is a 400.
///
/// # Response
///
/// - 200 `{"valid": true, "payload": {...}}`
/// - 401 `{"valid": false, "message": "..."}`
/// - 400 `{"message": "Token is required"}`
#[instrument(skip_all, name = "api.handlers.verify_token")]
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: VerifyTokenRequest = serde_json::from_slice(&body).unwrap_or_default();

    let token = request
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Token is required".to_string()))?;

    let response = match state.verifier.verify(token.trim()).await {
        AuthDecision::Accept(identity) => (
            StatusCode::OK,
            Json(VerifyTokenResponse {
                valid: true,
                payload: Some(identity),
                message: None,
            }),
        ),
        AuthDecision::Reject(err) => (
            StatusCode::UNAUTHORIZED,
            Json(VerifyTokenResponse {
                valid: false,
                payload: None,
                message: Some(err.to_string()),
            }),
        ),
    };

    Ok(response.into_response())
}

/// Handler for GET /api/auth/status
pub async fn get_auth_status(
    Extension(identity): Extension<DecodedIdentity>,
) -> Json<AuthStatusResponse> {
    Json(AuthStatusResponse {
        authenticated: true,
        user: identity,
    })
}

/// Handler for GET /api/auth/me
#[instrument(skip_all, name = "api.handlers.get_me")]
pub async fn get_me(Extension(identity): Extension<DecodedIdentity>) -> Json<MeResponse> {
    Json(MeResponse::from(&identity))
}
