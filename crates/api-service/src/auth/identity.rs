//! Identity extracted from an accepted token.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Claim set of an accepted token.
///
/// In secure mode the claims were signature-verified; in insecure mode they
/// were only decoded. Lives in request extensions for one request.
#[derive(Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedIdentity(Map<String, Value>);

impl DecodedIdentity {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Subject (`sub`).
    pub fn user_id(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    pub fn email(&self) -> Option<&str> {
        self.str_claim("email")
    }

    /// Display username. Cognito puts it in different claims depending on
    /// token type, so fall through `preferred_username`, `cognito:username`,
    /// then `username`.
    pub fn username(&self) -> Option<&str> {
        self.str_claim("preferred_username")
            .or_else(|| self.str_claim("cognito:username"))
            .or_else(|| self.str_claim("username"))
    }

    /// Full claim map.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_claims(self) -> Map<String, Value> {
        self.0
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

// Redact the subject; the rest of the claims are not logged at all.
impl fmt::Debug for DecodedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedIdentity")
            .field("sub", &"[REDACTED]")
            .field("claim_count", &self.0.len())
            .finish()
    }
}
