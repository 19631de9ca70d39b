use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::traits::scroller::{RequestTemplate, Scroller};
use crate::traits::transport::RestRequest;

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetConfig {
    /// Page size
    pub limit: u64,

    #[serde(default = "default_limit_param")]
    pub limit_param: String,

    #[serde(default = "default_offset_param")]
    pub offset_param: String,

    /// Send limit and offset on the first request too
    #[serde(default = "default_true")]
    pub first_page_params: bool,
}

impl OffsetConfig {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            limit_param: default_limit_param(),
            offset_param: default_offset_param(),
            first_page_params: true,
        }
    }
}

/// Moves an offset forward by the page size until a short page arrives.
///
/// A limit given in the job's own params takes precedence over the
/// configured one.
#[derive(Debug, Clone)]
pub struct OffsetScroller {
    config: OffsetConfig,
    offset: u64,
}

impl OffsetScroller {
    pub fn new(config: OffsetConfig) -> Self {
        Self { config, offset: 0 }
    }

    fn limit(&self, template: &RequestTemplate) -> u64 {
        template
            .params
            .get(&self.config.limit_param)
            .and_then(|value| match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(self.config.limit)
    }

    fn request(&self, template: &RequestTemplate) -> RestRequest {
        let limit = self.limit(template);
        template
            .request()
            .with_param(self.config.limit_param.clone(), json!(limit))
            .with_param(self.config.offset_param.clone(), json!(self.offset))
    }
}

impl Scroller for OffsetScroller {
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
        let limit = self.limit(template);
        if limit == 0 || (data.len() as u64) < limit {
            return None;
        }
        self.offset += limit;
        Some(self.request(template))
    }

    fn reset(&mut self) {
        self.offset = 0;
    }
}
