//! Per-configuration settings and the full run input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::api::ApiDefinition;
use crate::config::job::JobSpec;
use crate::expression::is_empty;

/// One logical configuration (e.g. one account) of an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Configuration name, part of the default output bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Top-level jobs
    pub jobs: Vec<JobSpec>,

    /// Operator attributes, available to expressions as `attr`
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ExtractorConfig {
    pub fn new(jobs: Vec<JobSpec>) -> Self {
        Self {
            name: None,
            jobs,
            attributes: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|value| !is_empty(value))
    }

    /// Request logging goes to `info` instead of `debug`.
    pub fn debug(&self) -> bool {
        self.attribute("debug").is_some_and(truthy)
    }

    pub fn incremental_output(&self) -> bool {
        self.attribute("incrementalOutput").is_some_and(truthy)
    }

    pub fn user_data(&self) -> Option<&Value> {
        self.attribute("userData")
    }

    /// Destination bucket for this configuration's tables.
    ///
    /// `None` is the default bucket.
    pub fn output_bucket(&self, api_name: &str) -> Option<String> {
        if let Some(bucket) = self.attribute("outputBucket").and_then(Value::as_str) {
            return Some(bucket.to_string());
        }
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| format!("ex-api-{}-{}", api_name, name))
    }
}

/// Everything one run needs: the API and its configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub api: ApiDefinition,
    pub configs: Vec<ExtractorConfig>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
        other => !is_empty(other),
    }
}
