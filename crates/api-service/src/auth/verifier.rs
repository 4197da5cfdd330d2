//! Token verification.
//!
//! Turns a raw bearer token into an accept/reject decision. The verification
//! mode is fixed at startup from [`AuthConfig::mode`]:
//!
//! - **Secure**: resolve the signing key by `kid`, then check expiry,
//!   signature, audience, and issuer in that order.
//! - **Insecure**: decode the claims without verifying anything. Only
//!   reachable when no JWKS source is configured AND the operator opted in.
//! - **Misconfigured**: reject every token with a configuration error.
//!
//! # Security
//!
//! - Only RSA signatures (RS256/RS384/RS512) are accepted
//! - The header `alg` must match the key's `alg` (RS256 when the key omits it)
//! - Expiry is strict (`now < exp`) with no leeway; a token without `exp`
//!   never expires, a non-numeric `exp` is an invalid token
//! - Expiry is checked before the signature, so an expired token is reported
//!   as expired whatever its signature

use crate::auth::cache::JwksCache;
use crate::auth::clock::{Clock, SystemClock};
use crate::auth::identity::DecodedIdentity;
use crate::auth::jwks::{HttpJwksFetcher, JwksFetcher, SigningKey};
use crate::auth::resolver::KeyResolver;
use crate::config::{AuthConfig, AuthMode};
use crate::errors::AuthError;
use crate::observability::metrics::record_jwt_validation;
use common::jwt::{decode_claims_unverified, parse_header, JwtValidationError};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Algorithm assumed for keys that do not declare one.
const DEFAULT_KEY_ALG: &str = "RS256";

/// Outcome of one verification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    Accept(DecodedIdentity),
    Reject(AuthError),
}

impl AuthDecision {
    pub fn into_result(self) -> Result<DecodedIdentity, AuthError> {
        match self {
            AuthDecision::Accept(identity) => Ok(identity),
            AuthDecision::Reject(err) => Err(err),
        }
    }
}

enum VerifierMode {
    Secure(KeyResolver),
    Insecure,
    Misconfigured,
}

/// Verifies bearer tokens according to the configured mode.
pub struct TokenVerifier {
    mode: VerifierMode,
    audience: Option<String>,
    issuer: Option<String>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Build a verifier that fetches keys over HTTP and uses the wall clock.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(HttpJwksFetcher::new(config.jwks_fetch_timeout)),
            Arc::new(SystemClock),
        )
    }

    /// Build a verifier with an injected fetcher and clock.
    pub fn with_parts(
        config: &AuthConfig,
        fetcher: Arc<dyn JwksFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mode = match config.mode() {
            AuthMode::Secure { jwks_url } => {
                if config.allow_insecure {
                    tracing::warn!(
                        target: "api.auth.verifier",
                        "ALLOW_INSECURE_JWT is set but a JWKS source is configured; verifying signatures"
                    );
                }
                let cache = Arc::new(JwksCache::new(
                    jwks_url,
                    fetcher,
                    Arc::clone(&clock),
                    config.jwks_cache_ttl,
                ));
                VerifierMode::Secure(KeyResolver::new(
                    cache,
                    Arc::clone(&clock),
                    config.forced_refresh_interval,
                ))
            }
            AuthMode::Insecure => VerifierMode::Insecure,
            AuthMode::Misconfigured => VerifierMode::Misconfigured,
        };

        Self {
            mode,
            audience: config.audience.clone(),
            issuer: config.issuer.clone(),
            clock,
        }
    }

    /// "secure", "insecure", or "misconfigured".
    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            VerifierMode::Secure(_) => "secure",
            VerifierMode::Insecure => "insecure",
            VerifierMode::Misconfigured => "misconfigured",
        }
    }

    /// The JWKS cache, in secure mode.
    pub fn key_cache(&self) -> Option<&Arc<JwksCache>> {
        match &self.mode {
            VerifierMode::Secure(resolver) => Some(resolver.cache()),
            _ => None,
        }
    }

    /// Verify a raw token.
    #[instrument(skip_all, name = "api.auth.verify")]
    pub async fn verify(&self, token: &str) -> AuthDecision {
        let start = Instant::now();

        let decision = match &self.mode {
            VerifierMode::Misconfigured => {
                tracing::error!(
                    target: "api.auth.verifier",
                    "Rejecting token: no JWKS source configured and insecure mode not enabled"
                );
                AuthDecision::Reject(AuthError::Configuration)
            }
            VerifierMode::Insecure => match decode_claims_unverified(token) {
                Ok(claims) => {
                    tracing::warn!(
                        target: "api.auth.verifier",
                        "Accepting token WITHOUT signature verification (ALLOW_INSECURE_JWT)"
                    );
                    AuthDecision::Accept(DecodedIdentity::new(claims))
                }
                Err(_) => AuthDecision::Reject(AuthError::BadSignature),
            },
            VerifierMode::Secure(resolver) => match self.verify_secure(resolver, token).await {
                Ok(claims) => AuthDecision::Accept(DecodedIdentity::new(claims)),
                Err(err) => AuthDecision::Reject(err),
            },
        };

        let result = match (&decision, &self.mode) {
            (AuthDecision::Accept(_), VerifierMode::Insecure) => "insecure",
            (AuthDecision::Accept(_), _) => "accepted",
            (AuthDecision::Reject(err), _) => err.label(),
        };
        record_jwt_validation(result, start.elapsed());

        if let AuthDecision::Reject(err) = &decision {
            tracing::debug!(target: "api.auth.verifier", reason = err.label(), "Token rejected");
        }

        decision
    }

    async fn verify_secure(
        &self,
        resolver: &KeyResolver,
        token: &str,
    ) -> Result<Map<String, Value>, AuthError> {
        let header = parse_header(token).map_err(|e| match e {
            JwtValidationError::TokenTooLarge | JwtValidationError::MalformedToken => {
                AuthError::MalformedToken
            }
        })?;

        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let key = resolver.resolve(&kid).await?;

        let unverified = decode_claims_unverified(token).map_err(|_| AuthError::MalformedToken)?;
        self.check_expiry(&unverified)?;

        let claims = verify_signature(token, &header.alg, &key)?;

        if let Some(expected) = &self.audience {
            if !audience_matches(&claims, expected) {
                return Err(AuthError::AudienceMismatch);
            }
        }

        if let Some(expected) = &self.issuer {
            if claims.get("iss").and_then(Value::as_str) != Some(expected.as_str()) {
                return Err(AuthError::IssuerMismatch);
            }
        }

        Ok(claims)
    }

    fn check_expiry(&self, claims: &Map<String, Value>) -> Result<(), AuthError> {
        let Some(exp) = claims.get("exp") else {
            return Ok(());
        };
        let exp = exp.as_f64().ok_or(AuthError::BadSignature)?;

        let now = self.clock.now().timestamp_millis() as f64 / 1000.0;
        if now < exp {
            Ok(())
        } else {
            Err(AuthError::Expired)
        }
    }
}

/// RSA algorithms accepted for signatures.
fn rsa_algorithm(alg: &str) -> Option<Algorithm> {
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        _ => None,
    }
}

/// Verify the signature with `key` and return the verified claims.
///
/// Claim checks are done by the caller, so jsonwebtoken is told to validate
/// nothing but the signature.
fn verify_signature(
    token: &str,
    header_alg: &str,
    key: &SigningKey,
) -> Result<Map<String, Value>, AuthError> {
    let algorithm = rsa_algorithm(header_alg).ok_or_else(|| {
        tracing::debug!(target: "api.auth.verifier", alg = %header_alg, "Unsupported token algorithm");
        AuthError::BadSignature
    })?;

    if key.kty != "RSA" {
        tracing::debug!(target: "api.auth.verifier", kid = %key.kid, kty = %key.kty, "Signing key is not RSA");
        return Err(AuthError::BadSignature);
    }

    let key_alg = key.alg.as_deref().unwrap_or(DEFAULT_KEY_ALG);
    if key_alg != header_alg {
        tracing::debug!(
            target: "api.auth.verifier",
            kid = %key.kid,
            key_alg = %key_alg,
            token_alg = %header_alg,
            "Token algorithm does not match signing key"
        );
        return Err(AuthError::BadSignature);
    }

    let (Some(n), Some(e)) = (key.n.as_deref(), key.e.as_deref()) else {
        tracing::warn!(target: "api.auth.verifier", kid = %key.kid, "Signing key has no RSA components");
        return Err(AuthError::BadSignature);
    };

    let decoding_key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
        tracing::warn!(target: "api.auth.verifier", kid = %key.kid, error = %err, "Invalid RSA key components");
        AuthError::BadSignature
    })?;

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation.leeway = 0;

    let token_data = decode::<Map<String, Value>>(token, &decoding_key, &validation).map_err(|err| {
        tracing::debug!(target: "api.auth.verifier", error = %err, "Signature verification failed");
        AuthError::BadSignature
    })?;

    Ok(token_data.claims)
}

/// `aud` equal to (or, as an array, containing) the expected value. Cognito
/// access tokens carry no `aud`; for those `client_id` must match instead.
fn audience_matches(claims: &Map<String, Value>, expected: &str) -> bool {
    match claims.get("aud") {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(expected)),
        Some(_) => false,
        None => claims.get("client_id").and_then(Value::as_str) == Some(expected),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::jwks::mock::MockJwksFetcher;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde_json::json;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AuthConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthConfig::from_vars(&vars).unwrap()
    }

    fn unsigned_token(header: Value, payload: Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    fn secure_verifier(keys: Vec<SigningKey>) -> (TokenVerifier, Arc<MockJwksFetcher>) {
        let fetcher = Arc::new(MockJwksFetcher::with_keys(keys));
        let verifier = TokenVerifier::with_parts(
            &config(&[("JWKS_URL", "https://keys.example.com/jwks.json")]),
            fetcher.clone(),
            Arc::new(ManualClock::at_unix(1_700_000_000)),
        );
        (verifier, fetcher)
    }

    fn key(kid: &str, kty: &str, alg: Option<&str>) -> SigningKey {
        SigningKey {
            kid: kid.to_string(),
            kty: kty.to_string(),
            alg: alg.map(ToString::to_string),
            key_use: Some("sig".to_string()),
            n: Some("AQAB".to_string()),
            e: Some("AQAB".to_string()),
        }
    }

    #[tokio::test]
    async fn test_misconfigured_rejects_every_token() {
        let verifier = TokenVerifier::from_config(&config(&[]));
        assert_eq!(verifier.mode_name(), "misconfigured");
        assert!(verifier.key_cache().is_none());

        let token = unsigned_token(json!({"alg": "RS256", "kid": "a"}), json!({"sub": "u"}));
        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::Configuration)
        );
        assert_eq!(
            verifier.verify("garbage").await,
            AuthDecision::Reject(AuthError::Configuration)
        );
    }

    #[tokio::test]
    async fn test_insecure_accepts_unsigned_token() {
        let verifier = TokenVerifier::from_config(&config(&[("ALLOW_INSECURE_JWT", "true")]));
        assert_eq!(verifier.mode_name(), "insecure");

        // No kid, no exp, bogus signature: all ignored in insecure mode
        let token = unsigned_token(
            json!({"alg": "none"}),
            json!({"sub": "dev-user", "email": "dev@example.com", "exp": 1}),
        );

        let identity = verifier.verify(&token).await.into_result().unwrap();
        assert_eq!(identity.user_id(), Some("dev-user"));
        assert_eq!(identity.email(), Some("dev@example.com"));
    }

    #[tokio::test]
    async fn test_insecure_rejects_undecodable_token() {
        let verifier = TokenVerifier::from_config(&config(&[("ALLOW_INSECURE_JWT", "1")]));

        assert_eq!(
            verifier.verify("not-a-jwt").await,
            AuthDecision::Reject(AuthError::BadSignature)
        );
    }

    #[tokio::test]
    async fn test_secure_mode_when_jwks_and_insecure_both_set() {
        let verifier = TokenVerifier::from_config(&config(&[
            ("JWKS_URL", "https://keys.example.com/jwks.json"),
            ("ALLOW_INSECURE_JWT", "true"),
        ]));

        assert_eq!(verifier.mode_name(), "secure");
        assert_eq!(
            verifier.key_cache().map(|c| c.jwks_url().to_string()),
            Some("https://keys.example.com/jwks.json".to_string())
        );
    }

    #[tokio::test]
    async fn test_secure_rejects_malformed_token_without_fetching() {
        let (verifier, fetcher) = secure_verifier(vec![]);

        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert_eq!(
                verifier.verify(token).await,
                AuthDecision::Reject(AuthError::MalformedToken),
                "token {token:?}"
            );
        }
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_secure_rejects_oversized_token() {
        let (verifier, fetcher) = secure_verifier(vec![]);
        let token = format!("{}.e30.sig", "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES));

        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::MalformedToken)
        );
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_secure_rejects_missing_or_empty_kid() {
        let (verifier, fetcher) = secure_verifier(vec![]);

        let no_kid = unsigned_token(json!({"alg": "RS256"}), json!({"exp": 2_000_000_000}));
        let empty_kid =
            unsigned_token(json!({"alg": "RS256", "kid": ""}), json!({"exp": 2_000_000_000}));

        assert_eq!(
            verifier.verify(&no_kid).await,
            AuthDecision::Reject(AuthError::MissingKeyId)
        );
        assert_eq!(
            verifier.verify(&empty_kid).await,
            AuthDecision::Reject(AuthError::MissingKeyId)
        );
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_secure_rejects_unknown_kid() {
        let (verifier, fetcher) = secure_verifier(vec![key("a", "RSA", None)]);
        let token = unsigned_token(
            json!({"alg": "RS256", "kid": "zzz"}),
            json!({"exp": 2_000_000_000}),
        );

        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::UnknownKey)
        );
        // Initial fetch plus one forced refresh
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_secure_expired_before_signature() {
        let (verifier, _fetcher) = secure_verifier(vec![key("a", "RSA", None)]);
        let token = unsigned_token(json!({"alg": "RS256", "kid": "a"}), json!({"exp": 1_600_000_000}));

        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::Expired)
        );
    }

    #[tokio::test]
    async fn test_secure_exp_equal_to_now_is_expired() {
        let (verifier, _fetcher) = secure_verifier(vec![key("a", "RSA", None)]);
        let token = unsigned_token(json!({"alg": "RS256", "kid": "a"}), json!({"exp": 1_700_000_000}));

        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::Expired)
        );
    }

    #[tokio::test]
    async fn test_secure_non_numeric_exp_is_invalid_token() {
        let (verifier, _fetcher) = secure_verifier(vec![key("a", "RSA", None)]);
        let textual = unsigned_token(json!({"alg": "RS256", "kid": "a"}), json!({"exp": "soon"}));

        assert_eq!(
            verifier.verify(&textual).await,
            AuthDecision::Reject(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_check_expiry_without_exp_never_expires() {
        let (verifier, _fetcher) = secure_verifier(vec![]);
        let claims = |value: Value| value.as_object().cloned().unwrap();

        assert_eq!(verifier.check_expiry(&claims(json!({"sub": "u"}))), Ok(()));
        assert_eq!(
            verifier.check_expiry(&claims(json!({"exp": null}))),
            Err(AuthError::BadSignature)
        );
        assert_eq!(
            verifier.check_expiry(&claims(json!({"exp": 1_600_000_000}))),
            Err(AuthError::Expired)
        );
    }

    #[tokio::test]
    async fn test_secure_rejects_non_rsa_algorithms() {
        let (verifier, _fetcher) = secure_verifier(vec![key("a", "RSA", None)]);

        for alg in ["HS256", "none", "ES256"] {
            let token = unsigned_token(json!({"alg": alg, "kid": "a"}), json!({"exp": 2_000_000_000}));
            assert_eq!(
                verifier.verify(&token).await,
                AuthDecision::Reject(AuthError::BadSignature),
                "alg {alg}"
            );
        }
    }

    #[tokio::test]
    async fn test_secure_rejects_alg_mismatch_with_key() {
        let (verifier, _fetcher) = secure_verifier(vec![key("a", "RSA", Some("RS512"))]);
        let token = unsigned_token(json!({"alg": "RS256", "kid": "a"}), json!({"exp": 2_000_000_000}));

        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::BadSignature)
        );
    }

    #[tokio::test]
    async fn test_secure_rejects_non_rsa_key() {
        let (verifier, _fetcher) = secure_verifier(vec![key("a", "EC", None)]);
        let token = unsigned_token(json!({"alg": "RS256", "kid": "a"}), json!({"exp": 2_000_000_000}));

        assert_eq!(
            verifier.verify(&token).await,
            AuthDecision::Reject(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_audience_matches() {
        let claims = |value: Value| value.as_object().cloned().unwrap();

        assert!(audience_matches(&claims(json!({"aud": "app"})), "app"));
        assert!(audience_matches(&claims(json!({"aud": ["x", "app"]})), "app"));
        assert!(audience_matches(&claims(json!({"client_id": "app"})), "app"));

        assert!(!audience_matches(&claims(json!({"aud": "other"})), "app"));
        assert!(!audience_matches(
            &claims(json!({"aud": "other-app", "client_id": "app"})),
            "app"
        ));
        assert!(!audience_matches(
            &claims(json!({"aud": ["x"], "client_id": "app"})),
            "app"
        ));
        assert!(!audience_matches(&claims(json!({"client_id": "other"})), "app"));
        assert!(!audience_matches(&claims(json!({"aud": ["x", "y"]})), "app"));
        assert!(!audience_matches(&claims(json!({})), "app"));
        assert!(!audience_matches(&claims(json!({"aud": 7})), "app"));
    }

    #[test]
    fn test_rsa_algorithm() {
        assert_eq!(rsa_algorithm("RS256"), Some(Algorithm::RS256));
        assert_eq!(rsa_algorithm("RS384"), Some(Algorithm::RS384));
        assert_eq!(rsa_algorithm("RS512"), Some(Algorithm::RS512));
        assert_eq!(rsa_algorithm("PS256"), None);
        assert_eq!(rsa_algorithm("rs256"), None);
    }
}
