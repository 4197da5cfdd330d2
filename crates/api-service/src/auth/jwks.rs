//! JWKS fetching.
//!
//! The fetcher is the pure I/O boundary of the auth subsystem: one GET to the
//! configured JWKS URL, bounded by a timeout, no retries and no caching.
//! Caching lives in [`crate::auth::cache`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Largest JWKS response body accepted (64 KiB).
pub const MAX_JWKS_BODY_BYTES: usize = 64 * 1024;

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SigningKey {
    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Key type (expected "RSA").
    pub kty: String,

    /// Algorithm (e.g. "RS256"). Absent means RS256.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
///
/// Entries are kept as raw JSON so one key this service cannot use (no `kid`,
/// an encryption key, an unknown shape) does not invalidate the whole set.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<serde_json::Value>,
}

impl JwksResponse {
    /// Signing keys in document order, skipping entries without a usable
    /// `kid` and `kty`.
    pub fn into_signing_keys(self) -> Vec<SigningKey> {
        self.keys
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<SigningKey>(entry) {
                Ok(key) if !key.kid.is_empty() => Some(key),
                Ok(_) => {
                    tracing::warn!(target: "api.auth.jwks", index, "Skipping JWKS entry with empty kid");
                    None
                }
                Err(e) => {
                    tracing::warn!(target: "api.auth.jwks", index, error = %e, "Skipping unusable JWKS entry");
                    None
                }
            })
            .collect()
    }
}

/// Why a JWKS fetch failed. Never surfaced to clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("JWKS request failed: {0}")]
    Network(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("JWKS response malformed: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Status(_) => "http_status",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

/// Retrieves the current key set from a JWKS URL.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<SigningKey>, FetchError>;
}

/// Fetcher backed by `reqwest`.
pub struct HttpJwksFetcher {
    http_client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "api.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self { http_client }
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    #[instrument(skip_all, name = "api.auth.jwks.fetch")]
    async fn fetch(&self, url: &str) -> Result<Vec<SigningKey>, FetchError> {
        tracing::debug!(target: "api.auth.jwks", url = %url, "Fetching JWKS");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_JWKS_BODY_BYTES as u64 {
                return Err(FetchError::Malformed(format!(
                    "body of {} bytes exceeds {} byte limit",
                    length, MAX_JWKS_BODY_BYTES
                )));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if body.len() > MAX_JWKS_BODY_BYTES {
            return Err(FetchError::Malformed(format!(
                "body of {} bytes exceeds {} byte limit",
                body.len(),
                MAX_JWKS_BODY_BYTES
            )));
        }

        let jwks: JwksResponse =
            serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        Ok(jwks.into_signing_keys())
    }
}

/// In-process fetcher for tests.
pub mod mock {
    use super::{FetchError, JwksFetcher, SigningKey};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Fetcher returning a settable response and counting calls.
    pub struct MockJwksFetcher {
        response: Mutex<Result<Vec<SigningKey>, FetchError>>,
        calls: AtomicUsize,
    }

    impl MockJwksFetcher {
        pub fn with_keys(keys: Vec<SigningKey>) -> Self {
            Self {
                response: Mutex::new(Ok(keys)),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn set_keys(&self, keys: Vec<SigningKey>) {
            *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Ok(keys);
        }

        pub fn set_error(&self, error: FetchError) {
            *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Err(error);
        }

        /// Number of `fetch` calls so far.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JwksFetcher for MockJwksFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<SigningKey>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }
}
