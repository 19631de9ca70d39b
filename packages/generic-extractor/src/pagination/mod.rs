//! Pagination strategies and the per-job pagination driver.
//!
//! An API definition names one strategy in its `pagination` block:
//!
//! ```json
//! { "method": "offset", "limit": 100, "offsetParam": "skip" }
//! ```
//!
//! Every running job gets a fresh [`Scroller`] built from that config,
//! wrapped in a [`PaginationDriver`] that adds the duplicate-page guard.

mod driver;
mod offset;
mod page_number;
mod response_url;

pub use driver::{page_hash, PageVerdict, PaginationDriver};
pub use offset::{OffsetConfig, OffsetScroller};
pub use page_number::{PageNumberConfig, PageNumberScroller};
pub use response_url::{ResponseUrlConfig, ResponseUrlScroller};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::scroller::{RequestTemplate, Scroller, ScrollerFactory};
use crate::traits::transport::RestRequest;

/// Pagination strategy of an API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum ScrollerConfig {
    /// One request per job
    #[default]
    #[serde(rename = "none")]
    None,

    #[serde(rename = "offset")]
    Offset(OffsetConfig),

    #[serde(rename = "pagenum")]
    PageNum(PageNumberConfig),

    /// Follow a next-page URL found in the response
    #[serde(rename = "response.url")]
    ResponseUrl(ResponseUrlConfig),
}

impl ScrollerFactory for ScrollerConfig {
    fn create(&self) -> Box<dyn Scroller> {
        match self {
            ScrollerConfig::None => Box::new(NoScroller),
            ScrollerConfig::Offset(config) => Box::new(OffsetScroller::new(config.clone())),
            ScrollerConfig::PageNum(config) => Box::new(PageNumberScroller::new(config.clone())),
            ScrollerConfig::ResponseUrl(config) => {
                Box::new(ResponseUrlScroller::new(config.clone()))
            }
        }
    }
}

/// Fetches the templated request once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScroller;

impl Scroller for NoScroller {
    fn first_request(&mut self, template: &RequestTemplate) -> Option<RestRequest> {
        Some(template.request())
    }

    fn next_request(
        &mut self,
        _template: &RequestTemplate,
        _response: &Value,
        _data: &[Value],
    ) -> Option<RestRequest> {
        None
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestMethod;
    use serde_json::{json, Map};

    pub(crate) fn template(endpoint: &str) -> RequestTemplate {
        RequestTemplate {
            job_id: endpoint.to_string(),
            endpoint: endpoint.to_string(),
            method: RequestMethod::Get,
            params: Map::new(),
        }
    }

    #[test]
    fn test_deserialize_methods() {
        let none: ScrollerConfig = serde_json::from_value(json!({"method": "none"})).unwrap();
        assert_eq!(none, ScrollerConfig::None);

        let offset: ScrollerConfig =
            serde_json::from_value(json!({"method": "offset", "limit": 50})).unwrap();
        match offset {
            ScrollerConfig::Offset(config) => {
                assert_eq!(config.limit, 50);
                assert_eq!(config.offset_param, "offset");
            }
            other => panic!("unexpected {:?}", other),
        }

        let url: ScrollerConfig = serde_json::from_value(
            json!({"method": "response.url", "urlKey": "links.next"}),
        )
        .unwrap();
        assert!(matches!(url, ScrollerConfig::ResponseUrl(ref c) if c.url_key == "links.next"));

        assert!(serde_json::from_value::<ScrollerConfig>(json!({"method": "cursor"})).is_err());
    }

    #[test]
    fn test_no_scroller_single_request() {
        let mut scroller = ScrollerConfig::None.create();
        let template = template("users");
        assert_eq!(scroller.first_request(&template), Some(template.request()));
        assert_eq!(
            scroller.next_request(&template, &json!([{"id": 1}]), &[json!({"id": 1})]),
            None
        );
    }
}
