//! JWT utilities shared across the PaaS backend crates.
//!
//! This module provides the parsing steps that happen BEFORE any
//! cryptographic verification:
//! - Size limits for DoS prevention
//! - Header parsing (`alg`, `kid`) without signature verification
//! - Unverified claim decoding for the local development fallback
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature; callers MUST verify the
//!   token against a trusted key before trusting any value returned here,
//!   except in the explicitly enabled insecure development mode
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::parse_header;
//!
//! let header = parse_header(token)?;
//! let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any base64 decoding or
/// cryptographic operation. Cognito ID tokens are typically 1-2KB, so 8KB
/// leaves room for custom attributes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while parsing a JWT before verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("Token exceeds maximum allowed size")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("Token is not a valid JWT")]
    MalformedToken,
}

// =============================================================================
// Header Types
// =============================================================================

/// The fields of a JWT header needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm (e.g. "RS256").
    pub alg: String,

    /// Key identifier. `None` when absent, empty, or not a string.
    pub kid: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWT into its three segments after the size check.
fn split_token(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode one base64url segment into a JSON object.
fn decode_segment(segment: &str, what: &'static str) -> Result<Map<String, Value>, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, segment = what, "Failed to decode JWT base64");
        JwtValidationError::MalformedToken
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            tracing::debug!(target: "common.jwt", segment = what, "JWT segment is not a JSON object");
            Err(JwtValidationError::MalformedToken)
        }
        Err(e) => {
            tracing::debug!(target: "common.jwt", error = %e, segment = what, "Failed to parse JWT JSON");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Parse the JWT header without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, invalid JSON, or no
///   string `alg` field
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    let (header_part, _, _) = split_token(token)?;
    let header = decode_segment(header_part, "header")?;

    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "common.jwt", "JWT header has no alg");
            JwtValidationError::MalformedToken
        })?;

    // Empty kid is treated the same as a missing one
    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(TokenHeader { alg, kid })
}

/// Decode the JWT payload WITHOUT verifying the signature or any claim.
///
/// Only the insecure development mode may accept the result as an identity.
/// Secure verification uses it to read `exp` before the signature check.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds size limit
/// - `MalformedToken` - Token format invalid or payload is not a JSON object
pub fn decode_claims_unverified(token: &str) -> Result<Map<String, Value>, JwtValidationError> {
    let (header_part, payload_part, _) = split_token(token)?;
    // A token whose header is garbage is rejected even when unverified
    decode_segment(header_part, "header")?;
    decode_segment(payload_part, "payload")
}

// =============================================================================
// Tests
// =============================================================================
