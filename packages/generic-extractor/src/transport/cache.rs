//! Response cache shared by every configuration of a run.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RequestMethod;
use crate::error::TransportResult;
use crate::traits::transport::{ClientConfig, RestRequest, Transport};

/// In-memory response store with a fixed TTL.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, (Instant, Value)>>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::default(),
        }
    }

    pub fn with_ttl_secs(ttl: u64) -> Self {
        Self::new(Duration::from_secs(ttl))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (Instant, Value)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for `key` if it has not expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

/// SHA-256 of the client scope, method, endpoint, sorted params and
/// request headers.
pub fn fingerprint(scope: &str, request: &RestRequest) -> String {
    let params: BTreeMap<&String, &Value> = request.params.iter().collect();
    let headers: BTreeMap<&String, &String> = request.headers.iter().collect();
    sha256_hex(&json!({
        "scope": scope,
        "method": request.method,
        "endpoint": request.endpoint,
        "params": params,
        "headers": headers,
    }))
}

/// Digest of what a client adds to every request: base URL, default
/// headers and query (where header and query auth live) and basic
/// credentials. Two accounts of one API never share a scope.
pub fn client_scope(config: &ClientConfig) -> String {
    let defaults = &config.defaults;
    let headers: BTreeMap<&String, &String> = defaults.headers.iter().collect();
    let query: BTreeMap<&String, &String> = defaults.query.iter().collect();
    sha256_hex(&json!({
        "base": config.base_url,
        "headers": headers,
        "query": query,
        "basic": defaults.basic_auth.as_ref().map(|credentials| credentials.digest()),
    }))
}

fn sha256_hex(key: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serves GET requests from a [`ResponseCache`] before asking the inner transport.
///
/// Entries are keyed per client scope, so configurations with different
/// credentials sharing one cache never see each other's responses.
pub struct CachedTransport {
    inner: Arc<dyn Transport>,
    cache: ResponseCache,
    scope: String,
}

impl CachedTransport {
    pub fn new(inner: Arc<dyn Transport>, cache: ResponseCache, client: &ClientConfig) -> Self {
        Self {
            inner,
            cache,
            scope: client_scope(client),
        }
    }
}

#[async_trait]
impl Transport for CachedTransport {
    async fn download(&self, request: &RestRequest) -> TransportResult<Value> {
        if request.method != RequestMethod::Get {
            return self.inner.download(request).await;
        }

        let key = fingerprint(&self.scope, request);
        if let Some(hit) = self.cache.get(&key) {
            debug!(endpoint = %request.endpoint, "Response served from cache");
            return Ok(hit);
        }

        let body = self.inner.download(request).await?;
        self.cache.put(key, body.clone());
        Ok(body)
    }

    fn name(&self) -> &str {
        "cached"
    }
}
