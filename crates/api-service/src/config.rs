//! API service configuration.
//!
//! Configuration is loaded once from environment variables at startup and
//! is read-only afterwards. Several settings accept two variable names (an
//! explicit one and a Cognito-flavored alias); the first non-empty value wins.

use common::config::{LogFormat, ObservabilityConfig};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default JWKS cache TTL in seconds (1 hour).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 3600;

/// Default JWKS fetch timeout in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Maximum JWKS fetch timeout in seconds. The fetch runs inline on the
/// request path, so a larger value would stall authenticated requests.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Default minimum interval between forced (rotation) JWKS refreshes.
pub const DEFAULT_FORCED_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// How the token verifier obtains trust, derived from [`AuthConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Verify signatures against the JWKS published at `jwks_url`.
    Secure { jwks_url: String },

    /// No JWKS source and the operator opted in: decode without verifying.
    Insecure,

    /// No JWKS source and no opt-in. Every protected request is rejected.
    Misconfigured,
}

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWKS URL, explicit or derived from pool id + region.
    pub jwks_url: Option<String>,

    /// Cognito user pool id (used for derivation and introspection).
    pub user_pool_id: Option<String>,

    /// AWS region (used for derivation and introspection).
    pub region: Option<String>,

    /// Expected audience. `None` skips the audience check.
    pub audience: Option<String>,

    /// Expected issuer, explicit or derived. `None` skips the issuer check.
    pub issuer: Option<String>,

    /// Operator opt-in for unverified decoding when no JWKS is configured.
    pub allow_insecure: bool,

    /// How long a fetched key set is served before refetching.
    pub jwks_cache_ttl: Duration,

    /// Timeout for the single outbound JWKS request.
    pub jwks_fetch_timeout: Duration,

    /// Minimum spacing between forced refreshes triggered by unknown `kid`s.
    pub forced_refresh_interval: Duration,
}

/// API service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Authentication settings.
    pub auth: AuthConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid ALLOW_INSECURE_JWT value: {0}")]
    InvalidInsecureFlag(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

/// First non-empty value among `names`.
fn first_var(vars: &HashMap<String, String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| vars.get(*name))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Parse a whole-seconds setting, validating it is within `min..=max`.
fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    min: u64,
    max: Option<u64>,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid non-negative integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value < min {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be at least {}, got {}",
            name, min, value
        )));
    }

    if let Some(max) = max {
        if value > max {
            return Err(ConfigError::InvalidDuration(format!(
                "{} must not exceed {} seconds, got {}",
                name, max, value
            )));
        }
    }

    Ok(Duration::from_secs(value))
}

/// Parse the insecure-mode opt-in. Only an explicit truthy value enables it.
fn parse_insecure_flag(vars: &HashMap<String, String>) -> Result<bool, ConfigError> {
    let Some(raw) = vars.get("ALLOW_INSECURE_JWT") else {
        return Ok(false);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "" | "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidInsecureFlag(format!(
            "expected one of 1/true/yes or 0/false/no, got '{}'",
            other
        ))),
    }
}

/// Cognito URL prefix for a pool in a region.
fn cognito_base_url(region: &str, pool: &str) -> String {
    format!("https://cognito-idp.{}.amazonaws.com/{}", region, pool)
}

impl AuthConfig {
    /// Load authentication settings from a variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let user_pool_id = first_var(vars, &["COGNITO_USER_POOL_ID", "COGNITO_POOL_ID"]);
        let region = first_var(vars, &["AWS_REGION", "COGNITO_REGION"]);

        // Priority: explicit URL, else derive from pool id + region
        let jwks_url = first_var(vars, &["COGNITO_JWKS_URL", "JWKS_URL"]).or_else(|| {
            match (&region, &user_pool_id) {
                (Some(region), Some(pool)) => Some(format!(
                    "{}/.well-known/jwks.json",
                    cognito_base_url(region, pool)
                )),
                _ => None,
            }
        });

        let audience = first_var(vars, &["JWT_AUDIENCE", "COGNITO_CLIENT_ID"]);

        let issuer = first_var(vars, &["JWT_ISSUER", "COGNITO_ISSUER"]).or_else(|| {
            match (&region, &user_pool_id) {
                (Some(region), Some(pool)) => Some(cognito_base_url(region, pool)),
                _ => None,
            }
        });

        let allow_insecure = parse_insecure_flag(vars)?;

        let jwks_cache_ttl = parse_seconds(
            vars,
            "JWKS_CACHE_TTL",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            1,
            None,
        )?;

        let jwks_fetch_timeout = parse_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            1,
            Some(MAX_JWKS_FETCH_TIMEOUT_SECONDS),
        )?;

        let forced_refresh_interval = parse_seconds(
            vars,
            "JWKS_FORCED_REFRESH_INTERVAL_SECONDS",
            DEFAULT_FORCED_REFRESH_INTERVAL_SECONDS,
            0,
            None,
        )?;

        Ok(AuthConfig {
            jwks_url,
            user_pool_id,
            region,
            audience,
            issuer,
            allow_insecure,
            jwks_cache_ttl,
            jwks_fetch_timeout,
            forced_refresh_interval,
        })
    }

    /// Resolve the verification mode.
    ///
    /// Insecure decoding requires BOTH no JWKS source and the explicit
    /// opt-in. A configured JWKS source always wins over the opt-in.
    pub fn mode(&self) -> AuthMode {
        match (&self.jwks_url, self.allow_insecure) {
            (Some(jwks_url), _) => AuthMode::Secure {
                jwks_url: jwks_url.clone(),
            },
            (None, true) => AuthMode::Insecure,
            (None, false) => AuthMode::Misconfigured,
        }
    }

    /// Whether clients must present verifiable tokens.
    pub fn requires_secure_jwt(&self) -> bool {
        !self.allow_insecure
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let auth = AuthConfig::from_vars(vars)?;

        let mut observability = ObservabilityConfig::default();
        if let Some(format) = vars.get("LOG_FORMAT") {
            observability.log_format = format
                .parse::<LogFormat>()
                .map_err(ConfigError::InvalidLogFormat)?;
        }

        Ok(Config {
            bind_address,
            auth,
            observability,
        })
    }
}
