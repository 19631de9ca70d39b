use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::response::value_at_path;
use crate::traits::scroller::{RequestTemplate, Scroller};
use crate::traits::transport::RestRequest;

fn default_url_key() -> String {
    "next".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseUrlConfig {
    /// Dotted path of the next-page URL in the response
    #[serde(default = "default_url_key")]
    pub url_key: String,

    /// Resend the job's params with the next-page URL
    #[serde(default)]
    pub include_params: bool,
}

impl Default for ResponseUrlConfig {
    fn default() -> Self {
        Self {
            url_key: default_url_key(),
            include_params: false,
        }
    }
}

/// Follows a next-page link carried in the response body.
#[derive(Debug, Clone)]
pub struct ResponseUrlScroller {
    config: ResponseUrlConfig,
}

impl ResponseUrlScroller {
    pub fn new(config: ResponseUrlConfig) -> Self {
        Self { config }
    }
}

impl Scroller for ResponseUrlScroller {
    fn first_request(&mut self, template: &RequestTemplate) -> Option<RestRequest> {
        Some(template.request())
    }

    fn next_request(
        &mut self,
        template: &RequestTemplate,
        response: &Value,
        _data: &[Value],
    ) -> Option<RestRequest> {
        let url = value_at_path(response, &self.config.url_key, ".")
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())?;

        let params = if self.config.include_params {
            template.params.clone()
        } else {
            Map::new()
        };
        Some(
            RestRequest::new(url)
                .with_method(template.method)
                .with_params(params),
        )
    }

    fn reset(&mut self) {}
}
