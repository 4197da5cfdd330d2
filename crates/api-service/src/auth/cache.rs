//! JWKS cache.
//!
//! Holds the most recently fetched key set and when it was fetched. Readers
//! take lock-free snapshots of the current generation; a successful fetch
//! swaps a fully built generation in. Keys are never merged across fetches.
//!
//! A failed fetch never raises: the cache logs it and keeps serving what it
//! has, which may be stale or empty.

use crate::auth::clock::Clock;
use crate::auth::jwks::{JwksFetcher, SigningKey};
use crate::observability::metrics::record_jwks_fetch;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// One immutable key set produced by a single fetch.
#[derive(Debug, Clone, Default)]
pub struct KeySetGeneration {
    /// Keys in the order the endpoint listed them.
    pub keys: Vec<SigningKey>,

    /// When this set was fetched. `None` for the initial empty generation.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl KeySetGeneration {
    /// Look up a key by `kid`.
    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Process-wide JWKS cache.
pub struct JwksCache {
    jwks_url: String,
    fetcher: Arc<dyn JwksFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    current: ArcSwap<KeySetGeneration>,
    refresh_requested: AtomicBool,
}

impl JwksCache {
    /// Create an empty cache. Nothing is fetched until the first lookup.
    pub fn new(
        jwks_url: String,
        fetcher: Arc<dyn JwksFetcher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            jwks_url,
            fetcher,
            clock,
            ttl,
            current: ArcSwap::from_pointee(KeySetGeneration::default()),
            refresh_requested: AtomicBool::new(false),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Current generation without triggering a fetch.
    pub fn snapshot(&self) -> Arc<KeySetGeneration> {
        self.current.load_full()
    }

    /// Make the next [`get_keys`](Self::get_keys) refetch regardless of TTL.
    ///
    /// The current keys stay in place until a fetch succeeds.
    pub fn invalidate(&self) {
        self.refresh_requested.store(true, Ordering::SeqCst);
    }

    /// Return a fresh key set, fetching if the current one is stale, empty,
    /// or invalidated.
    #[instrument(skip_all, name = "api.auth.jwks.get_keys")]
    pub async fn get_keys(&self) -> Arc<KeySetGeneration> {
        let current = self.current.load_full();

        if self.is_fresh(&current) {
            tracing::debug!(target: "api.auth.jwks", key_count = current.keys.len(), "JWKS cache hit");
            return current;
        }

        let start = Instant::now();
        match self.fetcher.fetch(&self.jwks_url).await {
            Ok(keys) => {
                record_jwks_fetch("success", start.elapsed());

                let generation = Arc::new(KeySetGeneration {
                    keys,
                    fetched_at: Some(self.clock.now()),
                });

                tracing::info!(
                    target: "api.auth.jwks",
                    key_count = generation.keys.len(),
                    "JWKS cache refreshed"
                );

                self.refresh_requested.store(false, Ordering::SeqCst);
                self.current.store(Arc::clone(&generation));
                generation
            }
            Err(e) => {
                record_jwks_fetch(e.label(), start.elapsed());

                tracing::warn!(
                    target: "api.auth.jwks",
                    error = %e,
                    cached_keys = current.keys.len(),
                    "JWKS fetch failed, serving cached keys"
                );

                self.current.load_full()
            }
        }
    }

    fn is_fresh(&self, generation: &KeySetGeneration) -> bool {
        if self.refresh_requested.load(Ordering::SeqCst) || generation.is_empty() {
            return false;
        }

        let Some(fetched_at) = generation.fetched_at else {
            return false;
        };

        // A clock that moved backwards yields a negative age; treat as stale.
        match (self.clock.now() - fetched_at).to_std() {
            Ok(age) => age < self.ttl,
            Err(_) => false,
        }
    }
}
