//! Job tree configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HTTP method used for a job's requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
}

/// Response filter declaration: one expression or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterDeclaration {
    One(String),
    Many(Vec<String>),
}

impl FilterDeclaration {
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            Self::One(expression) => vec![expression.as_str()],
            Self::Many(expressions) => expressions.iter().map(String::as_str).collect(),
        }
    }
}

/// Where a child placeholder takes its value from.
///
/// Either a dotted path into an ancestor row, or an object holding
/// `path` plus a transform expression evaluated with the extracted
/// value bound as `placeholder.value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaceholderSpec {
    Path(String),
    Transform(Map<String, Value>),
    Invalid(Value),
}

impl PlaceholderSpec {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }
}

/// Declarative description of one endpoint and its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Stable identifier, defaults to the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Endpoint template, `{name}` tokens are replaced from placeholders
    pub endpoint: String,

    #[serde(default)]
    pub method: RequestMethod,

    /// Raw request parameters, values may be user functions
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    /// Output table identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    /// Dotted path to the records inside the response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_filter: Option<FilterDeclaration>,

    /// Path separator used inside response filter field names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_filter_delimiter: Option<String>,

    /// Narrows which parent rows spawn this job (children only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_filter: Option<String>,

    /// Columns attached to every row of this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub placeholders: IndexMap<String, PlaceholderSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<JobSpec>,
}

impl JobSpec {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            id: None,
            endpoint: endpoint.into(),
            method: RequestMethod::Get,
            params: Map::new(),
            data_type: None,
            data_field: None,
            response_filter: None,
            response_filter_delimiter: None,
            recursion_filter: None,
            user_data: None,
            placeholders: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_data_field(mut self, data_field: impl Into<String>) -> Self {
        self.data_field = Some(data_field.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_placeholder(mut self, name: impl Into<String>, spec: PlaceholderSpec) -> Self {
        self.placeholders.insert(name.into(), spec);
        self
    }

    pub fn with_child(mut self, child: JobSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_response_filter(mut self, filter: impl Into<String>) -> Self {
        self.response_filter = Some(FilterDeclaration::One(filter.into()));
        self
    }

    pub fn with_recursion_filter(mut self, filter: impl Into<String>) -> Self {
        self.recursion_filter = Some(filter.into());
        self
    }

    pub fn with_user_data(mut self, user_data: Value) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn job_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.endpoint)
    }

    /// Output table name.
    ///
    /// Derived from the raw endpoint template so every instance of a
    /// child job writes into the same table.
    pub fn data_type(&self) -> String {
        match &self.data_type {
            Some(data_type) => data_type.clone(),
            None => self
                .endpoint
                .trim_matches('/')
                .replace(['{', '}'], "")
                .replace(['/', ':'], "_"),
        }
    }
}
