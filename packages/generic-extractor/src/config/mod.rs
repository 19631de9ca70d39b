//! Typed configuration graph.
//!
//! Loading and validating configuration files happens outside the
//! library; these types are what the engine consumes.

pub mod api;
pub mod extractor;
pub mod job;

pub use api::{ApiDefinition, CacheConfig, RetryConfig, CACHE_TTL};
pub use extractor::{ExtractorConfig, RunConfiguration};
pub use job::{FilterDeclaration, JobSpec, PlaceholderSpec, RequestMethod};
