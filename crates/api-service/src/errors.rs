//! API service error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Every error body has the shape `{"message": "..."}`. Internal details are
//! logged server-side, never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned when no JWKS source is configured and insecure mode
/// was not opted into.
pub const JWKS_NOT_CONFIGURED_MESSAGE: &str = "JWKS not configured. Set COGNITO_JWKS_URL or COGNITO_USER_POOL_ID+AWS_REGION; to allow insecure (dev) fallback set ALLOW_INSECURE_JWT=true";

const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"paas-api\", error=\"invalid_token\"";

/// Reasons a bearer token is rejected.
///
/// The `Display` text is the exact message returned to clients.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unauthorized")]
    MissingToken,

    #[error("Invalid token header")]
    MalformedToken,

    #[error("Invalid token (no kid)")]
    MissingKeyId,

    #[error("Unable to find key for token")]
    UnknownKey,

    #[error("Invalid token")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token audience")]
    AudienceMismatch,

    #[error("Invalid token issuer")]
    IssuerMismatch,

    #[error("{}", JWKS_NOT_CONFIGURED_MESSAGE)]
    Configuration,
}

impl AuthError {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::MissingKeyId => "missing_kid",
            AuthError::UnknownKey => "unknown_key",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::Configuration => "configuration",
        }
    }
}

/// API service error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 Unauthorized (with WWW-Authenticate)
/// - BadRequest: 400 Bad Request
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized(_) => 401,
            ApiError::BadRequest(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                message: self.to_string(),
            }),
        )
            .into_response();

        if let Ok(header_value) = WWW_AUTHENTICATE_VALUE.parse() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", header_value);
        }

        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(err) => err.into_response(),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Internal(detail) => {
                tracing::error!(target: "api.errors", error = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        message: "An internal error occurred".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_auth_error_messages() {
        assert_eq!(AuthError::MissingToken.to_string(), "Unauthorized");
        assert_eq!(AuthError::MalformedToken.to_string(), "Invalid token header");
        assert_eq!(AuthError::MissingKeyId.to_string(), "Invalid token (no kid)");
        assert_eq!(
            AuthError::UnknownKey.to_string(),
            "Unable to find key for token"
        );
        assert_eq!(AuthError::BadSignature.to_string(), "Invalid token");
        assert_eq!(AuthError::Expired.to_string(), "Token expired");
        assert_eq!(
            AuthError::AudienceMismatch.to_string(),
            "Invalid token audience"
        );
        assert_eq!(AuthError::IssuerMismatch.to_string(), "Invalid token issuer");
        assert_eq!(
            AuthError::Configuration.to_string(),
            JWKS_NOT_CONFIGURED_MESSAGE
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::from(AuthError::Expired).status_code(), 401);
        assert_eq!(ApiError::BadRequest("x".to_string()).status_code(), 400);
        assert_eq!(ApiError::Internal("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_api_error_display_is_transparent_for_auth() {
        let error = ApiError::from(AuthError::UnknownKey);
        assert_eq!(format!("{}", error), "Unable to find key for token");
    }

    #[tokio::test]
    async fn test_auth_error_into_response() {
        let response = AuthError::Expired.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response.headers().get("WWW-Authenticate").unwrap();
        assert!(www_auth.to_str().unwrap().starts_with("Bearer "));

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["message"], "Token expired");
    }

    #[tokio::test]
    async fn test_configuration_error_into_response() {
        let response = ApiError::from(AuthError::Configuration).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["message"], JWKS_NOT_CONFIGURED_MESSAGE);
    }

    #[tokio::test]
    async fn test_bad_request_into_response() {
        let response = ApiError::BadRequest("Token is required".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("WWW-Authenticate").is_none());

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["message"], "Token is required");
    }

    #[tokio::test]
    async fn test_internal_error_hides_detail() {
        let response = ApiError::Internal("serializer exploded".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body_json = read_body_json(response.into_body()).await;
        assert_eq!(body_json["message"], "An internal error occurred");
    }
}
