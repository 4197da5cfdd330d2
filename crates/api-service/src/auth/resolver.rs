//! Key resolution by `kid`, with one forced refresh for key rotation.

use crate::auth::cache::JwksCache;
use crate::auth::clock::Clock;
use crate::auth::jwks::SigningKey;
use crate::errors::AuthError;
use crate::observability::metrics::record_forced_refresh;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const NEVER: i64 = i64::MIN;

/// Finds the signing key for a token.
///
/// An unknown `kid` usually means the issuer rotated keys since the last
/// fetch, so a miss triggers exactly one invalidate-and-refetch before giving
/// up. Forced refreshes are spaced at least `forced_refresh_interval` apart
/// so a stream of tokens with bogus `kid`s cannot hammer the JWKS endpoint.
pub struct KeyResolver {
    cache: Arc<JwksCache>,
    clock: Arc<dyn Clock>,
    forced_refresh_interval: Duration,
    last_forced_refresh_ms: AtomicI64,
}

impl KeyResolver {
    pub fn new(
        cache: Arc<JwksCache>,
        clock: Arc<dyn Clock>,
        forced_refresh_interval: Duration,
    ) -> Self {
        Self {
            cache,
            clock,
            forced_refresh_interval,
            last_forced_refresh_ms: AtomicI64::new(NEVER),
        }
    }

    pub fn cache(&self) -> &Arc<JwksCache> {
        &self.cache
    }

    /// Resolve `kid` to a signing key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownKey` if the key is absent after at most one
    /// forced refresh.
    #[instrument(skip_all, name = "api.auth.resolve", fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<SigningKey, AuthError> {
        let generation = self.cache.get_keys().await;
        if let Some(key) = generation.find(kid) {
            return Ok(key.clone());
        }

        if !self.claim_forced_refresh() {
            record_forced_refresh("suppressed");
            tracing::debug!(
                target: "api.auth.resolver",
                kid = %kid,
                "Unknown kid, forced refresh suppressed by rate limit"
            );
            return Err(AuthError::UnknownKey);
        }

        record_forced_refresh("performed");
        tracing::info!(
            target: "api.auth.resolver",
            kid = %kid,
            "Unknown kid, forcing JWKS refresh"
        );

        self.cache.invalidate();
        let generation = self.cache.get_keys().await;

        match generation.find(kid) {
            Some(key) => Ok(key.clone()),
            None => {
                tracing::warn!(
                    target: "api.auth.resolver",
                    kid = %kid,
                    "Key not found in JWKS after forced refresh"
                );
                Err(AuthError::UnknownKey)
            }
        }
    }

    /// Atomically take the forced-refresh slot if the window has elapsed.
    fn claim_forced_refresh(&self) -> bool {
        let now_ms = self.clock.now().timestamp_millis();
        let interval_ms = i64::try_from(self.forced_refresh_interval.as_millis()).unwrap_or(i64::MAX);

        self.last_forced_refresh_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                let due = last == NEVER || now_ms.saturating_sub(last) >= interval_ms;
                due.then_some(now_ms)
            })
            .is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::jwks::mock::MockJwksFetcher;
    use crate::auth::jwks::FetchError;

    fn key(kid: &str) -> SigningKey {
        SigningKey {
            kid: kid.to_string(),
            kty: "RSA".to_string(),
            alg: None,
            key_use: None,
            n: Some("AQAB".to_string()),
            e: Some("AQAB".to_string()),
        }
    }

    fn setup(
        keys: Vec<SigningKey>,
        interval: Duration,
    ) -> (KeyResolver, Arc<MockJwksFetcher>, Arc<ManualClock>) {
        let fetcher = Arc::new(MockJwksFetcher::with_keys(keys));
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let cache = Arc::new(JwksCache::new(
            "https://keys.example.com/jwks.json".to_string(),
            fetcher.clone(),
            clock.clone(),
            Duration::from_secs(3600),
        ));
        let resolver = KeyResolver::new(cache, clock.clone(), interval);
        (resolver, fetcher, clock)
    }

    #[tokio::test]
    async fn test_resolves_known_kid() {
        let (resolver, fetcher, _clock) = setup(vec![key("a")], Duration::from_secs(30));

        let resolved = resolver.resolve("a").await.unwrap();

        assert_eq!(resolved.kid, "a");
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rotated_key_found_after_forced_refresh() {
        let (resolver, fetcher, _clock) = setup(vec![key("old")], Duration::from_secs(30));

        resolver.resolve("old").await.unwrap();
        fetcher.set_keys(vec![key("old"), key("new")]);

        let resolved = resolver.resolve("new").await.unwrap();

        assert_eq!(resolved.kid, "new");
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_kid_performs_exactly_one_forced_refresh() {
        let (resolver, fetcher, _clock) = setup(vec![key("a")], Duration::from_secs(30));

        resolver.resolve("a").await.unwrap();
        let result = resolver.resolve("missing").await;

        assert_eq!(result, Err(AuthError::UnknownKey));
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_is_rate_limited() {
        let (resolver, fetcher, clock) = setup(vec![key("a")], Duration::from_secs(30));

        resolver.resolve("a").await.unwrap();
        assert!(resolver.resolve("missing-1").await.is_err());
        assert_eq!(fetcher.call_count(), 2);

        // Within the window: answered from cache only
        clock.advance(Duration::from_secs(10));
        assert!(resolver.resolve("missing-2").await.is_err());
        assert_eq!(fetcher.call_count(), 2);

        // Window elapsed: one more forced refresh is allowed
        clock.advance(Duration::from_secs(20));
        assert!(resolver.resolve("missing-3").await.is_err());
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_rate_limit() {
        let (resolver, fetcher, _clock) = setup(vec![key("a")], Duration::ZERO);

        resolver.resolve("a").await.unwrap();
        assert!(resolver.resolve("missing-1").await.is_err());
        assert!(resolver.resolve("missing-2").await.is_err());

        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_kid_with_failing_fetch() {
        let (resolver, fetcher, _clock) = setup(vec![], Duration::from_secs(30));
        fetcher.set_error(FetchError::Network("down".to_string()));

        let result = resolver.resolve("a").await;

        assert_eq!(result, Err(AuthError::UnknownKey));
        // Initial fetch plus one forced refresh
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_known_kid_still_served_when_refresh_fails() {
        let (resolver, fetcher, clock) = setup(vec![key("a")], Duration::from_secs(30));

        resolver.resolve("a").await.unwrap();
        clock.advance(Duration::from_secs(7200));
        fetcher.set_error(FetchError::Status(500));

        let resolved = resolver.resolve("a").await.unwrap();
        assert_eq!(resolved.kid, "a");
    }
}
