//! API definition shared by every configuration of one extractor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthConfig;
use crate::pagination::ScrollerConfig;

/// Default response cache TTL in seconds.
pub const CACHE_TTL: u64 = 3600;

/// Transport-level settings for one REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDefinition {
    /// Short API name, used in default output bucket names
    #[serde(default = "default_api_name")]
    pub name: String,

    pub base_url: String,

    /// Default headers; values may be user functions over `attr`
    #[serde(default)]
    pub headers: Map<String, Value>,

    #[serde(default)]
    pub pagination: ScrollerConfig,

    #[serde(default)]
    pub retry_config: RetryConfig,

    #[serde(default)]
    pub authentication: AuthConfig,

    /// Enables the shared response cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    /// Client-side rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,

    /// Query parameters sent with every request
    #[serde(default)]
    pub default_request_options: Map<String, Value>,
}

fn default_api_name() -> String {
    "generic".to_string()
}

impl ApiDefinition {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: Map::new(),
            pagination: ScrollerConfig::default(),
            retry_config: RetryConfig::default(),
            authentication: AuthConfig::default(),
            cache: None,
            requests_per_second: None,
            default_request_options: Map::new(),
        }
    }

    pub fn with_pagination(mut self, pagination: ScrollerConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_authentication(mut self, authentication: AuthConfig) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Retry policy applied by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Status codes that are retried
    #[serde(default = "default_http_codes")]
    pub http_codes: Vec<u16>,

    /// First backoff delay, doubled on every attempt
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_max_retries() -> u32 {
    10
}

fn default_http_codes() -> Vec<u16> {
    vec![500, 502, 503, 504, 408, 420, 429]
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            http_codes: default_http_codes(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.http_codes.contains(&status)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt);
        self.backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms)
    }

    /// Delay before retry number `attempt`, honouring a server-sent
    /// `Retry-After` up to `backoff_max_ms`.
    pub fn delay_ms(&self, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
        match retry_after_ms {
            Some(requested) => requested.min(self.backoff_max_ms),
            None => self.backoff_ms(attempt),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached response stays valid
    #[serde(default = "default_ttl")]
    pub ttl: u64,
}

fn default_ttl() -> u64 {
    CACHE_TTL
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: CACHE_TTL }
    }
}
