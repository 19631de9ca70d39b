//! Transport trait for pluggable HTTP access.
//!
//! The engine never talks to the network directly. Everything that
//! leaves the process goes through a [`Transport`], which owns retries,
//! backoff, rate limiting and caching.
//!
//! # Usage
//!
//! ```rust,ignore
//! use generic_extractor::traits::transport::{RestRequest, Transport};
//!
//! let body = transport.download(&RestRequest::new("tickets")).await?;
//! ```

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::auth::credentials::BasicCredentials;
use crate::config::{RequestMethod, RetryConfig};
use crate::error::TransportResult;

/// One request as issued by a job.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: RequestMethod,

    /// Endpoint relative to the API base URL, or an absolute URL
    pub endpoint: String,

    /// Query parameters for GET, JSON body for POST
    pub params: Map<String, Value>,

    /// Request-specific headers
    pub headers: IndexMap<String, String>,
}

impl RestRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Get,
            endpoint: endpoint.into(),
            params: Map::new(),
            headers: IndexMap::new(),
        }
    }

    pub fn with_method(mut self, method: RequestMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Values added to every request a transport sends.
#[derive(Debug, Clone, Default)]
pub struct RequestDefaults {
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
    pub basic_auth: Option<BasicCredentials>,
}

/// Everything needed to build a transport for one configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub defaults: RequestDefaults,
    pub retry: RetryConfig,
    pub requests_per_second: Option<u32>,

    /// Log requests at `info` rather than `debug`
    pub verbose: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            defaults: RequestDefaults::default(),
            retry: RetryConfig::default(),
            requests_per_second: None,
            verbose: false,
        }
    }
}

/// Downloads a request and returns the decoded response body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one request.
    ///
    /// Retries are the transport's business: an error returned here is
    /// final and aborts the run.
    async fn download(&self, request: &RestRequest) -> TransportResult<Value>;

    /// Get the transport name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn download(&self, request: &RestRequest) -> TransportResult<Value> {
        (**self).download(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Creates the shared transport of one configuration.
pub trait TransportBuilder: Send + Sync {
    fn build(&self, config: ClientConfig) -> TransportResult<Arc<dyn Transport>>;
}
