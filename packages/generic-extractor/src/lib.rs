//! Configuration-Driven REST API Extractor
//!
//! Turns an arbitrary REST API into tables from a declarative job tree:
//! which endpoints to call, how they paginate, and how child jobs recurse
//! off parent rows ("for every ticket from `tickets`, call
//! `tickets/{id}/comments`").
//!
//! # Usage
//!
//! ```rust,ignore
//! use generic_extractor::{ApiDefinition, Executor, ExtractorConfig, JobSpec, PlaceholderSpec};
//! use generic_extractor::metadata::JsonFileMetadata;
//!
//! let api = ApiDefinition::new("helpdesk", "https://acme.example.com/api/v2/");
//! let tickets = JobSpec::new("tickets").with_child(
//!     JobSpec::new("tickets/{id}/comments")
//!         .with_data_type("comments")
//!         .with_placeholder("id", PlaceholderSpec::path("id")),
//! );
//!
//! let output = Executor::new(api)
//!     .run(&[ExtractorConfig::new(vec![tickets])], &JsonFileMetadata::new("state.json"))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (Transport, Scroller, TableParser, ...)
//! - [`config`] - Serde configuration graph
//! - [`job`] - Placeholder resolution and the recursive job runner
//! - [`extractor`] - Orchestrator for one configuration
//! - [`executor`] - Run coordinator across configurations and buckets
//! - [`pagination`] - Scroller strategies and the duplicate-page guard
//! - [`transport`] - reqwest client, retries, response cache
//! - [`testing`] - Mock implementations for testing

pub mod auth;
pub mod config;
pub mod error;
pub mod executor;
pub mod expression;
pub mod extractor;
pub mod job;
pub mod metadata;
pub mod pagination;
pub mod parser;
pub mod response;
pub mod testing;
pub mod traits;
pub mod transport;

// Re-export core types at crate root
pub use config::{
    ApiDefinition, CacheConfig, ExtractorConfig, FilterDeclaration, JobSpec, PlaceholderSpec,
    RequestMethod, RetryConfig, RunConfiguration,
};
pub use error::{ExtractorError, Result, TransportError, TransportResult};
pub use executor::{BucketResult, Executor, RunOutput};
pub use extractor::GenericExtractor;
pub use job::{AncestorChain, ExtractionJob, JobContext, LogContext, PlaceholderBinding};
pub use metadata::{JsonFileMetadata, MetadataStore, TimeWindow};
pub use pagination::{PaginationDriver, ScrollerConfig};
pub use parser::{JsonParser, Table};
pub use traits::{
    auth::Authenticator,
    expression::ExpressionEvaluator,
    metadata::MetadataPersistence,
    parser::TableParser,
    scroller::{Scroller, ScrollerFactory},
    transport::{ClientConfig, RestRequest, Transport, TransportBuilder},
};
pub use transport::{HttpTransportBuilder, ResponseCache, RestClient};

// Re-export testing utilities
pub use testing::{MockTransport, MockTransportBuilder};
