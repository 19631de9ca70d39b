//! Typed errors for the extractor.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use serde_json::Value;
use thiserror::Error;

/// Errors that abort an extraction run.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The job tree as declared cannot be executed
    #[error("config error: {message}")]
    Config { message: String },

    /// A placeholder addressed an ancestor level that does not exist
    #[error("Level {level} not found in parent results! Maximum level: {max_level}")]
    LevelNotFound {
        placeholder: String,
        level: usize,
        max_level: usize,
    },

    /// A placeholder path did not resolve inside the addressed ancestor row
    #[error("No value found for {placeholder} in parent result. (level: {level}, path: {path})")]
    ValueNotFound {
        placeholder: String,
        path: String,
        level: usize,
        parents: Vec<Value>,
    },

    /// A failure raised while running one job, tagged with that job
    #[error("job '{job_id}' ({endpoint}) failed: {source}")]
    Job {
        job_id: String,
        endpoint: String,
        #[source]
        source: Box<ExtractorError>,
    },

    /// Transport failed after its own retry policy gave up
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Structural parser rejected the records
    #[error("parser error for table '{table}': {message}")]
    Parser { table: String, message: String },

    /// User function or transform evaluation failed
    #[error("expression error: {message}")]
    Expression { message: String },

    /// Metadata snapshot could not be loaded or saved
    #[error("metadata error: {0}")]
    Metadata(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Job refused to start because the tree was already aborted
    #[error("operation cancelled")]
    Cancelled,
}

impl ExtractorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    /// Tag an error with the job it escaped from.
    ///
    /// Only the innermost job is recorded; errors already tagged and
    /// cancellations pass through untouched.
    pub fn in_job(self, job_id: &str, endpoint: &str) -> Self {
        match self {
            Self::Job { .. } | Self::Cancelled => self,
            other => Self::Job {
                job_id: job_id.to_string(),
                endpoint: endpoint.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any job tagging removed.
    pub fn root_cause(&self) -> &ExtractorError {
        match self {
            Self::Job { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Response body was not valid JSON
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Every retry attempt failed
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// Mock transport has no response for a URL
    #[error("no response registered for {url}")]
    NotFound { url: String },
}

/// Result type alias for extractor operations.
pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
