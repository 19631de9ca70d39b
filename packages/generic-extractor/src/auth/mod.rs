//! Authentication strategies.
//!
//! Each strategy mutates the [`ClientConfig`] of a configuration once,
//! before its transport is built.

pub mod credentials;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ExtractorError, Result};
use crate::expression::{build_values, scalar_to_string};
use crate::traits::auth::Authenticator;
use crate::traits::expression::ExpressionEvaluator;
use crate::traits::transport::ClientConfig;

pub use credentials::BasicCredentials;

/// Authentication declared in the API definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,

    /// Username and password read from the configuration attributes
    Basic,

    /// Query parameters, values may be user functions over `attr`
    Query {
        #[serde(default)]
        query: Map<String, Value>,
    },

    /// Headers, values may be user functions over `attr`
    Headers {
        #[serde(default)]
        headers: Map<String, Value>,
    },
}

impl AuthConfig {
    /// Resolve the strategy against one configuration's attributes.
    pub fn build(
        &self,
        attributes: &Map<String, Value>,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<Box<dyn Authenticator>> {
        let context = json!({ "attr": attributes });
        Ok(match self {
            Self::None => Box::new(NoAuth),
            Self::Basic => Box::new(BasicAuth::from_attributes(attributes)?),
            Self::Query { query } => Box::new(QueryAuth {
                query: stringify(build_values(evaluator, query, &context)?),
            }),
            Self::Headers { headers } => Box::new(HeaderAuth {
                headers: stringify(build_values(evaluator, headers, &context)?),
            }),
        })
    }
}

fn stringify(values: Map<String, Value>) -> Vec<(String, String)> {
    values
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(&value)))
        .collect()
}

/// Leaves the transport untouched.
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn authenticate(&self, _client: &mut ClientConfig) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// HTTP basic authentication.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    credentials: BasicCredentials,
}

impl BasicAuth {
    pub fn new(credentials: BasicCredentials) -> Self {
        Self { credentials }
    }

    /// Read `username`/`password`, accepting `#`-prefixed encrypted keys.
    pub fn from_attributes(attributes: &Map<String, Value>) -> Result<Self> {
        let lookup = |key: &str| {
            attributes
                .get(&format!("#{}", key))
                .or_else(|| attributes.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let username = lookup("username").ok_or_else(|| {
            ExtractorError::config("Basic authentication requires 'username' attribute")
        })?;
        let password = lookup("password").ok_or_else(|| {
            ExtractorError::config("Basic authentication requires 'password' attribute")
        })?;
        Ok(Self::new(BasicCredentials::new(username, password)))
    }
}

impl Authenticator for BasicAuth {
    fn authenticate(&self, client: &mut ClientConfig) -> Result<()> {
        debug!(username = %self.credentials.username, "Using basic authentication");
        client.defaults.basic_auth = Some(self.credentials.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "basic"
    }
}

/// Adds fixed query parameters to every request.
pub struct QueryAuth {
    query: Vec<(String, String)>,
}

impl Authenticator for QueryAuth {
    fn authenticate(&self, client: &mut ClientConfig) -> Result<()> {
        for (key, value) in &self.query {
            client.defaults.query.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "query"
    }
}

/// Adds fixed headers to every request.
pub struct HeaderAuth {
    headers: Vec<(String, String)>,
}

impl Authenticator for HeaderAuth {
    fn authenticate(&self, client: &mut ClientConfig) -> Result<()> {
        for (name, value) in &self.headers {
            client.defaults.headers.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "headers"
    }
}
