use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::traits::scroller::{RequestTemplate, Scroller};
use crate::traits::transport::RestRequest;

fn default_page_param() -> String {
    "page".to_string()
}

fn default_first_page() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNumberConfig {
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Page size; when set, a shorter page ends pagination
    #[serde(default)]
    pub limit: Option<u64>,

    #[serde(default)]
    pub limit_param: Option<String>,

    #[serde(default = "default_first_page")]
    pub first_page: u64,

    #[serde(default = "default_true")]
    pub first_page_params: bool,
}

impl Default for PageNumberConfig {
    fn default() -> Self {
        Self {
            page_param: default_page_param(),
            limit: None,
            limit_param: None,
            first_page: default_first_page(),
            first_page_params: true,
        }
    }
}

/// Increments a page number until an empty (or short) page arrives.
#[derive(Debug, Clone)]
pub struct PageNumberScroller {
    config: PageNumberConfig,
    page: u64,
}

impl PageNumberScroller {
    pub fn new(config: PageNumberConfig) -> Self {
        let page = config.first_page;
        Self { config, page }
    }

    fn request(&self, template: &RequestTemplate) -> RestRequest {
        let mut request = template
            .request()
            .with_param(self.config.page_param.clone(), json!(self.page));
        if let (Some(limit), Some(param)) = (self.config.limit, &self.config.limit_param) {
            request = request.with_param(param.clone(), json!(limit));
        }
        request
    }
}

impl Scroller for PageNumberScroller {
    fn first_request(&mut self, template: &RequestTemplate) -> Option<RestRequest> {
        if self.config.first_page_params {
            Some(self.request(template))
        } else {
            Some(template.request())
        }
    }

    fn next_request(
        &mut self,
        template: &RequestTemplate,
        _response: &Value,
        data: &[Value],
    ) -> Option<RestRequest> {
        if data.is_empty() {
            return None;
        }
        if let Some(limit) = self.config.limit {
            if (data.len() as u64) < limit {
                return None;
            }
        }
        self.page += 1;
        Some(self.request(template))
    }

    fn reset(&mut self) {
        self.page = self.config.first_page;
    }
}
