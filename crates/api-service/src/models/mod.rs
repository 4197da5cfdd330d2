//! API service models.
//!
//! Request and response bodies for the auth endpoints.

use crate::auth::DecodedIdentity;
use serde::{Deserialize, Serialize};

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

/// Response for `GET /api/auth/config`.
///
/// Public information a client needs to obtain tokens. No secrets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfigResponse {
    pub region: Option<String>,
    pub user_pool_id: Option<String>,
    pub issuer: Option<String>,
    pub jwks_url: Option<String>,
    pub requires_secure_jwt: bool,
}

/// Request body for `POST /api/auth/verify`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// Response for `POST /api/auth/verify`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<DecodedIdentity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response for `GET /api/auth/status`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub user: DecodedIdentity,
}

/// Response for `GET /api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl From<&DecodedIdentity> for MeResponse {
    fn from(identity: &DecodedIdentity) -> Self {
        Self {
            user_id: identity.user_id().map(ToString::to_string),
            email: identity.email().map(ToString::to_string),
            username: identity.username().map(ToString::to_string),
        }
    }
}
