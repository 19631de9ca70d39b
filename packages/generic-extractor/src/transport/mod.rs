//! Transport implementations.

mod cache;
mod http;

pub use cache::{client_scope, fingerprint, CachedTransport, ResponseCache};
pub use http::RestClient;

use std::sync::Arc;

use crate::error::TransportResult;
use crate::traits::transport::{ClientConfig, Transport, TransportBuilder};

/// Builds a [`RestClient`] per configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransportBuilder;

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TransportBuilder for HttpTransportBuilder {
    fn build(&self, config: ClientConfig) -> TransportResult<Arc<dyn Transport>> {
        Ok(Arc::new(RestClient::new(config)?))
    }
}
