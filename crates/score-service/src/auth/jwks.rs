//! Key-set cache for verifying tokens issued by the auth service.
//!
//! The auth service publishes its public signing keys as a JWKS document at
//! `{issuer}/api/auth/jwks`. [`KeySetCache`] keeps the most recently fetched
//! set together with its expiry and refetches lazily: the first caller that
//! finds the entry expired performs the fetch. There is no background timer.
//!
//! # Invariants
//!
//! - The key set and its expiry are stored as one `Option<CacheEntry>`, so a
//!   reader sees either the previous pair or the new one, never a mix
//! - `expires_at` is the fetch completion time plus the refresh interval
//! - The whole set is replaced on refresh; keys are never merged
//! - A failed refresh leaves the previous entry in place
//!
//! # Concurrency
//!
//! Cache hits only take the read lock. Refreshes are serialized on a
//! separate mutex. Every completed fetch bumps a generation counter; a caller
//! that queued behind a fetch takes that fetch's outcome, success or failure,
//! instead of fetching again. A burst of requests against an expired entry
//! therefore produces a single fetch even while the issuer is down. Each refresh
//! runs in its own task: a caller that is cancelled mid-refresh does not
//! cancel the fetch, and the result is still installed for later callers.

use crate::errors::KeySetUnavailable;
use crate::observability::metrics;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{instrument, Instrument};

/// Path of the key-set document relative to the issuer endpoint.
pub const JWKS_PATH: &str = "/api/auth/jwks";

/// Default refresh interval (15 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Longest accepted refresh interval (24 hours).
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default timeout for a single key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the key-set URL for an issuer endpoint.
pub fn jwks_url(issuer_endpoint: &str) -> String {
    format!("{}{}", issuer_endpoint.trim_end_matches('/'), JWKS_PATH)
}

/// JSON Web Key as published by the auth service.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "OKP", "RSA" or "EC".
    pub kty: String,

    /// Key ID, matched against the token header `kid`.
    pub kid: String,

    /// Algorithm the key is meant for (e.g. "EdDSA").
    #[serde(default)]
    pub alg: Option<String>,

    /// Intended use; "sig" when present.
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for OKP and EC keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key, or EC x coordinate (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// Key-set document body.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

/// Public keys indexed by key ID.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Jwk>,
}

impl KeySet {
    /// Index a list of keys by `kid`. A later duplicate replaces an earlier one.
    pub fn from_keys(keys: Vec<Jwk>) -> Self {
        let mut indexed = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(previous) = indexed.insert(key.kid.clone(), key) {
                tracing::warn!(target: "scores.auth.jwks", kid = %previous.kid, "Duplicate kid in key set");
            }
        }
        Self { keys: indexed }
    }

    /// Look up a key by ID.
    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<JwksDocument> for KeySet {
    fn from(document: JwksDocument) -> Self {
        Self::from_keys(document.keys)
    }
}

/// Source of key sets.
///
/// The HTTP implementation talks to the auth service; tests substitute
/// [`mock::MockKeySetFetcher`].
#[async_trait::async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch the complete current key set.
    async fn fetch(&self) -> Result<KeySet, KeySetUnavailable>;
}

/// Fetches the key-set document over HTTP.
pub struct HttpKeySetFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `{issuer_endpoint}/api/auth/jwks`.
    ///
    /// # Arguments
    ///
    /// * `issuer_endpoint` - Base URL of the auth service
    /// * `timeout` - Timeout for each fetch, connection included
    pub fn new(issuer_endpoint: &str, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "scores.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url: jwks_url(issuer_endpoint),
            http_client,
        }
    }

    /// The key-set URL this fetcher requests.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn fetch_document(&self) -> Result<JwksDocument, (&'static str, KeySetUnavailable)> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "scores.auth.jwks", error = %e, url = %self.jwks_url, "Failed to fetch key set");
                let error_type = if e.is_timeout() { "timeout" } else { "http" };
                (error_type, KeySetUnavailable(format!("request failed: {e}")))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "scores.auth.jwks",
                status = %status,
                url = %self.jwks_url,
                "Key set endpoint returned error"
            );
            return Err((
                "status",
                KeySetUnavailable(format!("issuer responded with {status}")),
            ));
        }

        response.json::<JwksDocument>().await.map_err(|e| {
            tracing::error!(target: "scores.auth.jwks", error = %e, "Failed to parse key set document");
            (
                "parse",
                KeySetUnavailable(format!("malformed key set document: {e}")),
            )
        })
    }
}

#[async_trait::async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<KeySet, KeySetUnavailable> {
        let start = std::time::Instant::now();

        match self.fetch_document().await {
            Ok(document) => {
                metrics::record_jwks_fetch("success", None, start.elapsed());
                let key_set = KeySet::from(document);
                if key_set.is_empty() {
                    tracing::warn!(target: "scores.auth.jwks", "Issuer published an empty key set");
                }
                Ok(key_set)
            }
            Err((error_type, error)) => {
                metrics::record_jwks_fetch("error", Some(error_type), start.elapsed());
                Err(error)
            }
        }
    }
}

/// Freshness of the cached entry, as reported by [`KeySetCache::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetStatus {
    /// Nothing has been fetched yet.
    Absent,
    /// A key set is cached and has not expired.
    Fresh,
    /// A key set is cached but past its expiry.
    Stale,
}

impl KeySetStatus {
    /// Lowercase name used in health responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySetStatus::Absent => "absent",
            KeySetStatus::Fresh => "fresh",
            KeySetStatus::Stale => "stale",
        }
    }
}

/// Cached key set paired with its expiry.
struct CacheEntry {
    key_set: Arc<KeySet>,
    expires_at: Instant,
}

impl CacheEntry {
    fn fresh_key_set(&self) -> Option<Arc<KeySet>> {
        (Instant::now() < self.expires_at).then(|| Arc::clone(&self.key_set))
    }
}

/// Concurrency-safe, freshness-bounded cache of the issuer's key set.
pub struct KeySetCache {
    /// Where key sets come from.
    fetcher: Arc<dyn KeySetFetcher>,

    /// Current entry; `None` until the first successful fetch.
    entry: Arc<RwLock<Option<CacheEntry>>>,

    /// Serializes refreshes; holds the outcome of the last fetch.
    refresh_lock: Arc<Mutex<Option<KeySetUnavailable>>>,

    /// Number of completed fetches. Only written under `refresh_lock`.
    fetch_generation: Arc<AtomicU64>,

    /// How long a fetched key set is trusted.
    refresh_interval: Duration,
}

impl KeySetCache {
    /// Create a cache for an issuer endpoint with default interval and timeout.
    pub fn new(issuer_endpoint: &str) -> Self {
        Self::with_fetcher(
            Arc::new(HttpKeySetFetcher::new(
                issuer_endpoint,
                DEFAULT_FETCH_TIMEOUT,
            )),
            DEFAULT_REFRESH_INTERVAL,
        )
    }

    /// Create a cache over any fetcher.
    ///
    /// A zero interval falls back to [`DEFAULT_REFRESH_INTERVAL`]; anything
    /// above [`MAX_REFRESH_INTERVAL`] is capped.
    pub fn with_fetcher(fetcher: Arc<dyn KeySetFetcher>, refresh_interval: Duration) -> Self {
        let refresh_interval = if refresh_interval.is_zero() {
            tracing::warn!(target: "scores.auth.jwks", "Zero refresh interval requested, using default");
            DEFAULT_REFRESH_INTERVAL
        } else {
            refresh_interval.min(MAX_REFRESH_INTERVAL)
        };

        Self {
            fetcher,
            entry: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(None)),
            fetch_generation: Arc::new(AtomicU64::new(0)),
            refresh_interval,
        }
    }

    /// The configured refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Fetch the key set unconditionally and install it.
    ///
    /// Readiness precondition: the service calls this once before accepting
    /// protected traffic and must not start if it fails.
    ///
    /// # Errors
    ///
    /// Returns `KeySetUnavailable` if the fetch fails.
    pub async fn initialize(&self) -> Result<(), KeySetUnavailable> {
        let key_set = self.refresh(true).await?;
        tracing::info!(
            target: "scores.auth.jwks",
            key_count = key_set.len(),
            "Key set cache initialized"
        );
        Ok(())
    }

    /// Return a key set that has not expired, refreshing first if necessary.
    ///
    /// # Errors
    ///
    /// Returns `KeySetUnavailable` if the entry is missing or expired and the
    /// refresh fails. The previous entry is kept but not served.
    pub async fn get_current_key_set(&self) -> Result<Arc<KeySet>, KeySetUnavailable> {
        if let Some(key_set) = self
            .entry
            .read()
            .await
            .as_ref()
            .and_then(CacheEntry::fresh_key_set)
        {
            tracing::trace!(target: "scores.auth.jwks", "Key set cache hit");
            metrics::record_jwks_cache_lookup("hit");
            return Ok(key_set);
        }

        tracing::debug!(target: "scores.auth.jwks", "Key set missing or expired, refreshing");
        metrics::record_jwks_cache_lookup("refresh");
        self.refresh(false).await
    }

    /// Report the state of the cached entry without fetching.
    pub async fn status(&self) -> KeySetStatus {
        match self.entry.read().await.as_ref() {
            None => KeySetStatus::Absent,
            Some(entry) if Instant::now() < entry.expires_at => KeySetStatus::Fresh,
            Some(_) => KeySetStatus::Stale,
        }
    }

    /// Expiry of the cached entry, if any.
    pub async fn expires_at(&self) -> Option<Instant> {
        self.entry
            .read()
            .await
            .as_ref()
            .map(|entry| entry.expires_at)
    }

    /// Run a refresh in a detached task and wait for its result.
    ///
    /// Unless `force` is set, a refresh that finds the entry already fresh
    /// once it holds the refresh lock returns that entry instead of fetching,
    /// and a refresh that queued behind a failed fetch returns that failure.
    #[instrument(skip(self))]
    async fn refresh(&self, force: bool) -> Result<Arc<KeySet>, KeySetUnavailable> {
        let fetcher = Arc::clone(&self.fetcher);
        let entry = Arc::clone(&self.entry);
        let refresh_lock = Arc::clone(&self.refresh_lock);
        let fetch_generation = Arc::clone(&self.fetch_generation);
        let refresh_interval = self.refresh_interval;

        // Read before queueing: any fetch completing after this point is one
        // this caller waited on.
        let observed_generation = fetch_generation.load(Ordering::Acquire);

        let task = tokio::spawn(
            async move {
                let mut last_failure = refresh_lock.lock().await;

                if !force {
                    if let Some(key_set) = entry.read().await.as_ref().and_then(CacheEntry::fresh_key_set) {
                        tracing::debug!(target: "scores.auth.jwks", "Key set refreshed by a concurrent caller");
                        return Ok(key_set);
                    }

                    if fetch_generation.load(Ordering::Acquire) != observed_generation {
                        if let Some(error) = last_failure.as_ref() {
                            tracing::debug!(target: "scores.auth.jwks", "Concurrent key set refresh failed, not retrying");
                            return Err(error.clone());
                        }
                    }
                }

                let fetched = fetcher.fetch().await;
                *last_failure = fetched.as_ref().err().cloned();
                fetch_generation.fetch_add(1, Ordering::Release);

                let key_set = Arc::new(fetched?);
                let expires_at = Instant::now() + refresh_interval;

                *entry.write().await = Some(CacheEntry {
                    key_set: Arc::clone(&key_set),
                    expires_at,
                });

                tracing::info!(
                    target: "scores.auth.jwks",
                    key_count = key_set.len(),
                    refresh_interval_secs = refresh_interval.as_secs(),
                    "Key set cache refreshed"
                );

                Ok(key_set)
            }
            .in_current_span(),
        );

        task.await.map_err(|e| {
            tracing::error!(target: "scores.auth.jwks", error = %e, "Key set refresh task failed");
            KeySetUnavailable("refresh task failed".to_string())
        })?
    }
}

/// Test double for [`KeySetFetcher`].
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher returning a programmable key set or failure.
    pub struct MockKeySetFetcher {
        /// Key set returned by the next fetch; `None` means fail.
        response: Mutex<Option<KeySet>>,
        /// Simulated network latency.
        delay: Duration,
        /// Number of fetches performed.
        fetch_count: AtomicUsize,
    }

    impl MockKeySetFetcher {
        /// A fetcher that always returns `key_set`.
        pub fn returning(key_set: KeySet) -> Self {
            Self {
                response: Mutex::new(Some(key_set)),
                delay: Duration::ZERO,
                fetch_count: AtomicUsize::new(0),
            }
        }

        /// A fetcher that always fails.
        pub fn failing() -> Self {
            Self {
                response: Mutex::new(None),
                delay: Duration::ZERO,
                fetch_count: AtomicUsize::new(0),
            }
        }

        /// Sleep for `delay` inside every fetch.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Replace what subsequent fetches return.
        pub async fn set_response(&self, key_set: Option<KeySet>) {
            *self.response.lock().await = key_set;
        }

        /// Number of fetches performed so far.
        pub fn fetch_count(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl KeySetFetcher for MockKeySetFetcher {
        async fn fetch(&self) -> Result<KeySet, KeySetUnavailable> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.response
                .lock()
                .await
                .clone()
                .ok_or_else(|| KeySetUnavailable("mock issuer unavailable".to_string()))
        }
    }
}
