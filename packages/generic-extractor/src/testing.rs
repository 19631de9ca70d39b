//! Testing utilities including mock implementations.
//!
//! These are useful for testing job trees and configurations without
//! making real HTTP calls.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{TransportError, TransportResult};
use crate::traits::transport::{ClientConfig, RestRequest, Transport, TransportBuilder};

/// Mock transport for testing.
///
/// Responses are registered per endpoint as a sequence of pages. Each
/// download of an endpoint returns the next page; once the sequence is
/// exhausted the last page is returned again, which is how an API that
/// never signals the end of pagination behaves.
///
/// # Example
///
/// ```rust
/// use generic_extractor::testing::MockTransport;
/// use serde_json::json;
///
/// let mock = MockTransport::new()
///     .with_response("tickets", json!([{"id": 1}]))
///     .with_pages("users", vec![json!([{"id": 1}]), json!([])]);
/// ```
#[derive(Default, Clone)]
pub struct MockTransport {
    /// Canned pages by endpoint
    pages: Arc<RwLock<HashMap<String, Vec<Value>>>>,

    /// Next page index by endpoint
    cursors: Arc<RwLock<HashMap<String, usize>>>,

    /// Endpoints answering with an error status
    failures: Arc<RwLock<HashMap<String, u16>>>,

    /// Every request, in order
    calls: Arc<RwLock<Vec<RestRequest>>>,

    delay: Option<Duration>,
}

impl MockTransport {
    /// Create a new empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single response for an endpoint.
    pub fn add_response(&self, endpoint: impl Into<String>, response: Value) {
        self.add_pages(endpoint, vec![response]);
    }

    /// Register a page sequence for an endpoint.
    pub fn add_pages(&self, endpoint: impl Into<String>, pages: Vec<Value>) {
        let endpoint = endpoint.into();
        write(&self.cursors).remove(&endpoint);
        write(&self.pages).insert(endpoint, pages);
    }

    /// Make an endpoint fail with `status` (builder pattern).
    pub fn with_failure(self, endpoint: impl Into<String>, status: u16) -> Self {
        write(&self.failures).insert(endpoint.into(), status);
        self
    }

    /// Single response for an endpoint (builder pattern).
    pub fn with_response(self, endpoint: impl Into<String>, response: Value) -> Self {
        self.add_response(endpoint, response);
        self
    }

    /// Page sequence for an endpoint (builder pattern).
    pub fn with_pages(self, endpoint: impl Into<String>, pages: Vec<Value>) -> Self {
        self.add_pages(endpoint, pages);
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of downloads.
    pub fn call_count(&self) -> usize {
        read(&self.calls).len()
    }

    /// Get every request that was downloaded.
    pub fn calls(&self) -> Vec<RestRequest> {
        read(&self.calls).clone()
    }

    /// Get the endpoints requested, in order.
    pub fn endpoints(&self) -> Vec<String> {
        read(&self.calls).iter().map(|r| r.endpoint.clone()).collect()
    }

    /// Number of downloads of one endpoint.
    pub fn calls_to(&self, endpoint: &str) -> usize {
        read(&self.calls)
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .count()
    }

    /// Clear recorded calls and rewind every page sequence.
    pub fn reset_calls(&self) {
        write(&self.calls).clear();
        write(&self.cursors).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn download(&self, request: &RestRequest) -> TransportResult<Value> {
        write(&self.calls).push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = read(&self.failures).get(&request.endpoint) {
            return Err(TransportError::Status {
                status: *status,
                url: request.endpoint.clone(),
                body: String::new(),
            });
        }

        let pages = read(&self.pages);
        let sequence = pages
            .get(&request.endpoint)
            .filter(|pages| !pages.is_empty())
            .ok_or_else(|| TransportError::NotFound {
                url: request.endpoint.clone(),
            })?;

        let mut cursors = write(&self.cursors);
        let cursor = cursors.entry(request.endpoint.clone()).or_insert(0);
        let page = sequence[(*cursor).min(sequence.len() - 1)].clone();
        *cursor += 1;
        Ok(page)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Transport builder handing out a shared [`MockTransport`].
///
/// Records every [`ClientConfig`] it was asked to build from, so tests can
/// assert on headers, auth and retry settings.
#[derive(Default, Clone)]
pub struct MockTransportBuilder {
    transport: MockTransport,
    configs: Arc<RwLock<Vec<ClientConfig>>>,
}

impl MockTransportBuilder {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            configs: Arc::default(),
        }
    }

    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    /// Client configs passed to `build`, in order.
    pub fn configs(&self) -> Vec<ClientConfig> {
        read(&self.configs).clone()
    }
}

impl TransportBuilder for MockTransportBuilder {
    fn build(&self, config: ClientConfig) -> TransportResult<Arc<dyn Transport>> {
        write(&self.configs).push(config);
        Ok(Arc::new(self.transport.clone()))
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
