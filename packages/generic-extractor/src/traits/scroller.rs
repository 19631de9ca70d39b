//! Pagination strategy abstraction.

use serde_json::{Map, Value};

use crate::config::RequestMethod;
use crate::traits::transport::RestRequest;

/// The templated request description of one running job.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub job_id: String,
    pub endpoint: String,
    pub method: RequestMethod,
    pub params: Map<String, Value>,
}

impl RequestTemplate {
    /// The request with no pagination applied.
    pub fn request(&self) -> RestRequest {
        RestRequest::new(self.endpoint.clone())
            .with_method(self.method)
            .with_params(self.params.clone())
    }
}

/// Produces the request sequence for one job.
///
/// A scroller is owned by exactly one running job and keeps whatever
/// position state the strategy needs between calls.
pub trait Scroller: Send + Sync {
    /// Request for the first page, `None` if nothing should be fetched.
    fn first_request(&mut self, template: &RequestTemplate) -> Option<RestRequest>;

    /// Request for the page after `response`, `None` when done.
    fn next_request(
        &mut self,
        template: &RequestTemplate,
        response: &Value,
        data: &[Value],
    ) -> Option<RestRequest>;

    /// Forget any position state.
    fn reset(&mut self);
}

/// Builds a fresh scroller for every running job.
pub trait ScrollerFactory: Send + Sync {
    fn create(&self) -> Box<dyn Scroller>;
}
