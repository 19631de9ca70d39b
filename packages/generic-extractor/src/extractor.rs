//! Extraction orchestrator.
//!
//! Wires the transport, parser, cache and authentication of one API
//! definition and runs a configuration's top-level jobs.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ApiDefinition, ExtractorConfig};
use crate::error::Result;
use crate::expression::{build_values, scalar_to_string, UserFunctions};
use crate::job::{ExtractionJob, JobContext, LogContext};
use crate::metadata::MetadataStore;
use crate::parser::JsonParser;
use crate::traits::expression::ExpressionEvaluator;
use crate::traits::parser::TableParser;
use crate::traits::scroller::ScrollerFactory;
use crate::traits::transport::{ClientConfig, Transport, TransportBuilder};
use crate::transport::{CachedTransport, HttpTransportBuilder, ResponseCache};

/// Runs configurations against one API.
///
/// # Example
///
/// ```rust,ignore
/// use generic_extractor::{ApiDefinition, ExtractorConfig, GenericExtractor, JobSpec};
///
/// let api = ApiDefinition::new("zendesk", "https://acme.zendesk.com/api/v2/");
/// let mut extractor = GenericExtractor::new(api);
/// extractor.run(&ExtractorConfig::new(vec![JobSpec::new("tickets")])).await?;
///
/// for table in extractor.parser().map(|p| p.results()).unwrap_or_default() {
///     println!("{}: {} rows", table.name, table.row_count());
/// }
/// ```
pub struct GenericExtractor {
    api: ApiDefinition,
    metadata: MetadataStore,
    transport_builder: Arc<dyn TransportBuilder>,
    scrollers: Arc<dyn ScrollerFactory>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    cache: Option<ResponseCache>,
    parser: Option<Arc<dyn TableParser>>,
    child_concurrency: usize,
}

impl GenericExtractor {
    pub fn new(api: ApiDefinition) -> Self {
        let scrollers = Arc::new(api.pagination.clone());
        Self {
            api,
            metadata: MetadataStore::new(),
            transport_builder: Arc::new(HttpTransportBuilder::new()),
            scrollers,
            evaluator: Arc::new(UserFunctions::new()),
            cache: None,
            parser: None,
            child_concurrency: 1,
        }
    }

    pub fn with_transport_builder(mut self, builder: Arc<dyn TransportBuilder>) -> Self {
        self.transport_builder = builder;
        self
    }

    /// Replace the scroller factory derived from the API's pagination.
    pub fn with_scroller_factory(mut self, scrollers: Arc<dyn ScrollerFactory>) -> Self {
        self.scrollers = scrollers;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Maximum child jobs in flight per page; 1 runs the tree depth-first.
    pub fn with_child_concurrency(mut self, concurrency: usize) -> Self {
        self.child_concurrency = concurrency.max(1);
        self
    }

    /// Serve GET requests from `cache` first.
    pub fn enable_cache(&mut self, cache: ResponseCache) {
        self.cache = Some(cache);
    }

    /// Append to an existing parser instead of creating one.
    pub fn set_parser(&mut self, parser: Arc<dyn TableParser>) {
        self.parser = Some(parser);
    }

    pub fn parser(&self) -> Option<Arc<dyn TableParser>> {
        self.parser.clone()
    }

    pub fn set_metadata(&mut self, metadata: MetadataStore) {
        self.metadata = metadata;
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn into_metadata(self) -> MetadataStore {
        self.metadata
    }

    /// Run every top-level job of `config` in order.
    ///
    /// Observed schema is folded into the metadata only when all jobs
    /// succeed; a failed run leaves it untouched.
    pub async fn run(&mut self, config: &ExtractorConfig) -> Result<()> {
        let name = config.name.clone().unwrap_or_default();
        let log = LogContext::new(name, config.debug());

        let client_config = self.client_config(config)?;
        let transport = self.transport_builder.build(client_config.clone())?;
        let transport: Arc<dyn Transport> = match &self.cache {
            Some(cache) => Arc::new(CachedTransport::new(transport, cache.clone(), &client_config)),
            None => transport,
        };
        let parser = self.init_parser();

        let ctx = JobContext {
            transport,
            parser: parser.clone(),
            scrollers: self.scrollers.clone(),
            evaluator: self.evaluator.clone(),
            attributes: config.attributes.clone(),
            time: self.metadata.time_context(),
            cancel: CancellationToken::new(),
            child_concurrency: self.child_concurrency,
            log,
        };

        info!(
            api = %self.api.name,
            jobs = config.jobs.len(),
            "Starting extraction"
        );
        for spec in &config.jobs {
            let job = ExtractionJob::top_level(spec, config.user_data(), ctx.scrollers.as_ref())
                .map_err(|err| err.in_job(spec.job_id(), &spec.endpoint))?;
            job.run(&ctx).await?;
        }

        self.metadata.merge_schema(parser.schema_state());
        info!(api = %self.api.name, "Extraction finished");
        Ok(())
    }

    fn init_parser(&mut self) -> Arc<dyn TableParser> {
        if let Some(parser) = &self.parser {
            return parser.clone();
        }
        let parser: Arc<dyn TableParser> =
            Arc::new(JsonParser::with_schema(self.metadata.schema.clone()));
        self.parser = Some(parser.clone());
        parser
    }

    /// Client settings for `config`: evaluated headers, default query,
    /// retry, rate limit and authentication.
    fn client_config(&self, config: &ExtractorConfig) -> Result<ClientConfig> {
        let context = json!({ "attr": config.attributes });
        let mut client = ClientConfig::new(self.api.base_url.clone());

        client.defaults.headers = stringify(build_values(
            self.evaluator.as_ref(),
            &self.api.headers,
            &context,
        )?);
        client.defaults.query = stringify(self.api.default_request_options.clone());
        client.retry = self.api.retry_config.clone();
        client.requests_per_second = self.api.requests_per_second;
        client.verbose = config.debug();

        let authenticator = self
            .api
            .authentication
            .build(&config.attributes, self.evaluator.as_ref())?;
        authenticator.authenticate(&mut client)?;
        debug!(auth = %authenticator.name(), "Authentication applied");

        Ok(client)
    }
}

fn stringify(values: Map<String, Value>) -> IndexMap<String, String> {
    values
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(&value)))
        .collect()
}
