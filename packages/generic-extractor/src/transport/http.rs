//! HTTP transport implementation.
//!
//! Provides JSON REST access with retries, backoff and rate limiting.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RequestMethod;
use crate::error::{TransportError, TransportResult};
use crate::expression::scalar_to_string;
use crate::traits::transport::{ClientConfig, RestRequest, Transport};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Longest response body kept in a status error.
const ERROR_BODY_LIMIT: usize = 512;

/// Outcome of one attempt that did not produce a body.
enum AttemptError {
    Retryable {
        error: TransportError,
        retry_after_ms: Option<u64>,
    },
    Fatal(TransportError),
}

/// REST client for one API configuration.
///
/// Relative endpoints are joined to the base URL, absolute ones are used
/// as given (next-page links). GET params become the query string, POST
/// params the JSON body.
///
/// # Example
///
/// ```rust,ignore
/// use generic_extractor::transport::RestClient;
/// use generic_extractor::traits::transport::{ClientConfig, RestRequest, Transport};
///
/// let client = RestClient::new(ClientConfig::new("https://api.example.com/v2/"))?;
/// let body = client.download(&RestRequest::new("tickets")).await?;
/// ```
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
    limiter: Option<Arc<DefaultRateLimiter>>,
}

impl RestClient {
    /// Create a client with a default `reqwest` client.
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("generic-extractor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Http(Box::new(e)))?;
        Self::with_client(client, config)
    }

    /// Create a client around an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> TransportResult<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Ok(Self {
            client,
            base_url,
            config,
            limiter,
        })
    }

    /// Absolute URL of an endpoint.
    ///
    /// Only `http` and `https` endpoints are absolute; anything else,
    /// `customers:search` included, is relative to the base URL.
    pub fn resolve_url(&self, endpoint: &str) -> TransportResult<Url> {
        if let Ok(absolute) = Url::parse(endpoint) {
            if matches!(absolute.scheme(), "http" | "https") {
                return Ok(absolute);
            }
        }
        let relative = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("./{}", endpoint)
        };
        self.base_url
            .join(&relative)
            .map_err(|_| TransportError::InvalidUrl {
                url: format!("{}{}", self.base_url, endpoint),
            })
    }

    async fn attempt(&self, request: &RestRequest, url: &Url) -> Result<Value, AttemptError> {
        let defaults = &self.config.defaults;

        let mut builder = match request.method {
            RequestMethod::Get => self.client.get(url.clone()),
            RequestMethod::Post => self.client.post(url.clone()),
        };
        for (name, value) in defaults.headers.iter().chain(request.headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(credentials) = &defaults.basic_auth {
            builder = builder.header(AUTHORIZATION, credentials.header_value());
        }

        let mut query: Vec<(String, String)> = defaults
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        match request.method {
            RequestMethod::Get => query.extend(
                request
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), scalar_to_string(v))),
            ),
            RequestMethod::Post => builder = builder.json(&request.params),
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                AttemptError::Retryable {
                    error: TransportError::Http(Box::new(e)),
                    retry_after_ms: None,
                }
            } else {
                AttemptError::Fatal(TransportError::Http(Box::new(e)))
            }
        })?;

        let status = response.status();
        if self.config.verbose {
            info!(method = ?request.method, url = %url, status = status.as_u16(), "HTTP response");
        } else {
            debug!(method = ?request.method, url = %url, status = status.as_u16(), "HTTP response");
        }

        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let cut = (0..=ERROR_BODY_LIMIT)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            let error = TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            };
            return Err(if self.config.retry.should_retry_status(status.as_u16()) {
                AttemptError::Retryable {
                    error,
                    retry_after_ms,
                }
            } else {
                AttemptError::Fatal(error)
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::Fatal(TransportError::Http(Box::new(e))))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            AttemptError::Fatal(TransportError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
        })
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn download(&self, request: &RestRequest) -> TransportResult<Value> {
        let url = self.resolve_url(&request.endpoint)?;
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            match self.attempt(request, &url).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable { error, .. }) if retry.max_retries == 0 => {
                    return Err(error)
                }
                Err(AttemptError::Retryable {
                    error,
                    retry_after_ms,
                }) => {
                    if attempt >= retry.max_retries {
                        return Err(TransportError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt + 1,
                            last: error.to_string(),
                        });
                    }
                    let delay_ms = retry.delay_ms(attempt, retry_after_ms);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        delay_ms,
                        error = %error,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Base URLs are directories: `https://host/api/v2` joins like `https://host/api/v2/`.
fn parse_base_url(base_url: &str) -> TransportResult<Url> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Url::parse(&normalized).map_err(|_| TransportError::InvalidUrl {
        url: base_url.to_string(),
    })
}

/// `Retry-After` in seconds as milliseconds; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.checked_mul(1000).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;

    fn client(base: &str) -> RestClient {
        RestClient::new(ClientConfig::new(base)).unwrap()
    }

    #[test]
    fn test_resolve_relative_endpoint() {
        let client = client("https://api.example.com/v2");
        assert_eq!(
            client.resolve_url("tickets/1/comments").unwrap().as_str(),
            "https://api.example.com/v2/tickets/1/comments"
        );
    }

    #[test]
    fn test_resolve_absolute_endpoint() {
        let client = client("https://api.example.com/v2/");
        assert_eq!(
            client
                .resolve_url("https://cdn.example.com/page?cursor=2")
                .unwrap()
                .as_str(),
            "https://cdn.example.com/page?cursor=2"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            RestClient::new(ClientConfig::new("not a url")),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_resolve_endpoint_with_colon() {
        let client = client("https://api.example.com/v2/");
        assert_eq!(
            client.resolve_url("customers:search").unwrap().as_str(),
            "https://api.example.com/v2/customers:search"
        );
        assert_eq!(
            client.resolve_url("/status").unwrap().as_str(),
            "https://api.example.com/status"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(3000));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("99999999999999999"), Some(u64::MAX));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let retry = RetryConfig {
            backoff_max_ms: 60_000,
            ..RetryConfig::default()
        };
        let huge = parse_retry_after("99999999999999999");
        assert_eq!(retry.delay_ms(0, huge), 60_000);
        assert_eq!(retry.delay_ms(0, Some(2_000)), 2_000);
        assert_eq!(retry.delay_ms(1, None), retry.backoff_ms(1));
    }

    #[tokio::test]
    async fn test_connection_errors_are_retried() {
        let mut config = ClientConfig::new("http://127.0.0.1:1/");
        config.retry = RetryConfig {
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            ..RetryConfig::default()
        };
        let client = RestClient::new(config).unwrap();

        match client.download(&RestRequest::new("users")).await {
            Err(TransportError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }
}
