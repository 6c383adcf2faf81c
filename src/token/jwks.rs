use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;

use super::config::JwksConfig;
use crate::AuthError;

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

fn decoding_keys(set: JwkSet) -> Result<Vec<(String, DecodingKey)>, AuthError> {
    let mut keys = Vec::with_capacity(set.keys.len());
    for jwk in set.keys {
        let kid = jwk
            .kid
            .ok_or_else(|| AuthError::KeyUnavailable("JWKS entry missing kid".into()))?;
        let kty = jwk.kty.unwrap_or_else(|| "RSA".to_owned());
        if kty != "RSA" {
            return Err(AuthError::KeyUnavailable(format!(
                "key '{kid}' has unsupported type '{kty}'"
            )));
        }
        if let Some(alg) = jwk.alg {
            if alg != "RS256" {
                return Err(AuthError::KeyUnavailable(format!(
                    "key '{kid}' has unsupported alg '{alg}'"
                )));
            }
        }
        let modulus = jwk
            .n
            .ok_or_else(|| AuthError::KeyUnavailable(format!("key '{kid}' missing modulus")))?;
        let exponent = jwk
            .e
            .ok_or_else(|| AuthError::KeyUnavailable(format!("key '{kid}' missing exponent")))?;

        let key = DecodingKey::from_rsa_components(&modulus, &exponent)
            .map_err(|e| AuthError::KeyUnavailable(format!("key '{kid}' unparsable: {e}")))?;
        keys.push((kid, key));
    }
    Ok(keys)
}

/// Source of verification keys for the external asymmetric scheme.
///
/// Abstracted so the cache can be exercised without a network; production
/// uses [`JwksFetcher`].
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<Vec<(String, DecodingKey)>, AuthError>;
}

/// Fetches a well-known JWKS document over HTTPS with a bounded timeout.
pub struct JwksFetcher {
    client: reqwest::Client,
    url: String,
}

impl JwksFetcher {
    /// Builds the fetcher with the configured per-request timeout. A client
    /// that cannot be constructed with the timeout is a configuration
    /// error, not something to fall back from.
    pub fn new(config: &JwksConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("JWKS client build failed: {e}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySource for JwksFetcher {
    async fn fetch_keys(&self) -> Result<Vec<(String, DecodingKey)>, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::KeyUnavailable(format!("JWKS fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyUnavailable(format!(
                "JWKS endpoint returned HTTP {} for {}",
                response.status(),
                self.url
            )));
        }

        let body: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyUnavailable(format!("JWKS response unparsable: {e}")))?;

        decoding_keys(body)
    }
}

struct CacheState {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
    generation: u64,
    /// Outcome of the refresh that produced `generation`, when it left the
    /// cache unusable. Waiters parked on the gate report this instead of
    /// misreading an empty key set as a bad token.
    last_error: Option<AuthError>,
}

/// TTL'd cache of JWKS decoding keys with a singleflight refresh.
///
/// A miss (or an unknown kid) triggers at most one outbound fetch no matter
/// how many requests are waiting: latecomers park on the refresh gate and
/// reuse whatever the winner fetched. Readers of a fresh entry never touch
/// the gate. When a fetch fails, the previous key set is served up to
/// `max_stale` past its fetch time; beyond that the cache fails closed.
pub struct JwksCache {
    source: Box<dyn KeySource>,
    ttl: std::time::Duration,
    max_stale: std::time::Duration,
    state: RwLock<CacheState>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl JwksCache {
    pub fn new(
        source: impl KeySource + 'static,
        ttl: std::time::Duration,
        max_stale: std::time::Duration,
    ) -> Self {
        Self {
            source: Box::new(source),
            ttl,
            max_stale,
            state: RwLock::new(CacheState {
                keys: HashMap::new(),
                fetched_at: None,
                generation: 0,
                last_error: None,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &JwksConfig) -> Result<Self, AuthError> {
        Ok(Self::new(
            JwksFetcher::new(config)?,
            config.ttl,
            config.max_stale,
        ))
    }

    /// Resolves the decoding key for a kid, refreshing the key set when the
    /// cache is cold, expired, or does not know the kid yet.
    ///
    /// An unknown kid after a refresh is `InvalidToken` (the token names a
    /// key the issuer does not publish); fetch failure with no usable cache
    /// is `KeyUnavailable`.
    pub async fn resolve(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let seen_generation = {
            let state = self.read_state()?;
            if let Some(key) = Self::lookup(&state, kid, self.ttl) {
                return Ok(key);
            }
            state.generation
        };

        self.refresh(seen_generation).await?;

        // A refresh that returned Ok left the cache in a sanctioned state
        // (freshly fetched, or stale within the ceiling), so presence is the
        // only remaining question.
        let state = self.read_state()?;
        state.keys.get(kid).cloned().ok_or(AuthError::InvalidToken)
    }

    /// Number of keys currently cached. Exposed for diagnostics.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, CacheState>, AuthError> {
        self.state
            .read()
            .map_err(|_| AuthError::Internal("jwks cache lock poisoned".into()))
    }

    fn lookup(state: &CacheState, kid: &str, window: std::time::Duration) -> Option<DecodingKey> {
        let fetched_at = state.fetched_at?;
        if fetched_at.elapsed() >= window {
            return None;
        }
        state.keys.get(kid).cloned()
    }

    /// Refreshes the key set unless another caller already did so while we
    /// waited on the gate (generation double-check).
    async fn refresh(&self, seen_generation: u64) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;

        {
            let state = self.read_state()?;
            if state.generation != seen_generation {
                // Someone else finished a refresh attempt while we waited;
                // share its outcome rather than fetching again.
                return match &state.last_error {
                    Some(e) => Err(e.clone()),
                    None => Ok(()),
                };
            }
        }

        match self.source.fetch_keys().await {
            Ok(keys) => {
                let mut state = self
                    .state
                    .write()
                    .map_err(|_| AuthError::Internal("jwks cache lock poisoned".into()))?;
                state.keys = keys.into_iter().collect();
                state.fetched_at = Some(Instant::now());
                state.generation += 1;
                state.last_error = None;
                log::debug!(
                    target: "portcullis",
                    "msg=\"jwks refreshed\", keys={}",
                    state.keys.len()
                );
                Ok(())
            }
            Err(e) => {
                let mut state = self
                    .state
                    .write()
                    .map_err(|_| AuthError::Internal("jwks cache lock poisoned".into()))?;
                state.generation += 1;

                let stale_usable = state
                    .fetched_at
                    .is_some_and(|at| at.elapsed() < self.max_stale)
                    && !state.keys.is_empty();
                if stale_usable {
                    state.last_error = None;
                    log::warn!(
                        target: "portcullis",
                        "msg=\"jwks refresh failed, serving stale keys\", error=\"{e}\""
                    );
                    Ok(())
                } else {
                    state.last_error = Some(e.clone());
                    Err(e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    const FRESH: Duration = Duration::from_secs(300);

    struct CountingSource {
        fetches: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail_after: None,
            }
        }

        fn failing_after(n: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail_after: Some(n),
            }
        }

        fn count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySource for Arc<CountingSource> {
        async fn fetch_keys(&self) -> Result<Vec<(String, DecodingKey)>, AuthError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so concurrent resolvers pile onto the
            // refresh gate.
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(AuthError::KeyUnavailable("upstream down".into()));
            }
            Ok(vec![(
                "kid-1".to_owned(),
                DecodingKey::from_secret(b"irrelevant"),
            )])
        }
    }

    #[tokio::test]
    async fn test_singleflight_one_fetch_for_concurrent_misses() {
        let source = Arc::new(CountingSource::new());
        let cache = Arc::new(JwksCache::new(Arc::clone(&source), FRESH, FRESH));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.resolve("kid-1").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(source.count(), 1, "cold cache must fetch exactly once");
    }

    #[tokio::test]
    async fn test_fresh_hit_does_not_refetch() {
        let source = Arc::new(CountingSource::new());
        let cache = JwksCache::new(Arc::clone(&source), FRESH, FRESH);

        cache.resolve("kid-1").await.unwrap();
        cache.resolve("kid-1").await.unwrap();
        assert_eq!(source.count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_once_then_rejects() {
        let source = Arc::new(CountingSource::new());
        let cache = JwksCache::new(Arc::clone(&source), FRESH, FRESH);

        cache.resolve("kid-1").await.unwrap();
        let err = cache.resolve("kid-unknown").await.err().unwrap();
        assert_eq!(err, AuthError::InvalidToken);
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn test_stale_served_within_ceiling() {
        // ttl zero forces a refresh attempt on every resolve; the second
        // attempt fails upstream but the previous key set is still inside
        // the staleness ceiling.
        let source = Arc::new(CountingSource::failing_after(1));
        let cache = JwksCache::new(Arc::clone(&source), Duration::ZERO, FRESH);

        cache.resolve("kid-1").await.unwrap();
        cache.resolve("kid-1").await.unwrap();
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn test_fails_closed_past_staleness_ceiling() {
        let source = Arc::new(CountingSource::failing_after(1));
        let cache = JwksCache::new(Arc::clone(&source), Duration::ZERO, Duration::ZERO);

        cache.resolve("kid-1").await.unwrap();
        let err = cache.resolve("kid-1").await.err().unwrap();
        assert!(matches!(err, AuthError::KeyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_concurrent_failure_reports_key_unavailable_to_all_waiters() {
        // Waiters parked on the refresh gate share the winner's failure;
        // none of them mistake the empty key set for a bad token.
        let source = Arc::new(CountingSource::failing_after(0));
        let cache = Arc::new(JwksCache::new(Arc::clone(&source), FRESH, FRESH));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.resolve("kid-1").await }));
        }
        for handle in handles {
            let err = handle.await.unwrap().err().unwrap();
            assert!(matches!(err, AuthError::KeyUnavailable(_)), "got {err:?}");
        }

        assert_eq!(source.count(), 1, "one fetch attempt for the whole flight");
    }

    #[tokio::test]
    async fn test_cold_cache_fetch_failure_is_key_unavailable() {
        let source = Arc::new(CountingSource::failing_after(0));
        let cache = JwksCache::new(Arc::clone(&source), FRESH, FRESH);

        let err = cache.resolve("kid-1").await.err().unwrap();
        assert!(matches!(err, AuthError::KeyUnavailable(_)));
    }

    #[test]
    fn test_fetcher_builds_with_configured_timeout() {
        let config = JwksConfig::new("https://id.example.com/jwks.json")
            .with_fetch_timeout(std::time::Duration::from_secs(3));
        let fetcher = JwksFetcher::new(&config).unwrap();
        assert_eq!(fetcher.url(), "https://id.example.com/jwks.json");

        assert!(JwksCache::from_config(&config).is_ok());
    }

    #[test]
    fn test_jwk_parsing_rejects_non_rsa() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{ "kid": "k", "kty": "EC", "n": "AQAB", "e": "AQAB" }]
        }))
        .unwrap();
        assert!(matches!(
            decoding_keys(set).err().unwrap(),
            AuthError::KeyUnavailable(_)
        ));
    }

    #[test]
    fn test_jwk_parsing_requires_kid() {
        let set: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{ "kty": "RSA", "n": "AQAB", "e": "AQAB" }]
        }))
        .unwrap();
        assert!(matches!(
            decoding_keys(set).err().unwrap(),
            AuthError::KeyUnavailable(_)
        ));
    }
}
