//! Run coordinator.
//!
//! Runs every configuration of a run against the same API, groups the
//! produced tables by output bucket and persists metadata once at the end.

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

use crate::config::{ApiDefinition, ExtractorConfig};
use crate::error::Result;
use crate::expression::UserFunctions;
use crate::extractor::GenericExtractor;
use crate::metadata::MetadataStore;
use crate::traits::expression::ExpressionEvaluator;
use crate::traits::metadata::MetadataPersistence;
use crate::traits::parser::{Table, TableParser};
use crate::traits::transport::TransportBuilder;
use crate::transport::{HttpTransportBuilder, ResponseCache};

/// Tables written to one output bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketResult {
    /// `None` is the default bucket
    pub bucket: Option<String>,
    pub tables: Vec<Table>,

    /// Any configuration writing here asked for incremental output
    pub incremental: bool,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub buckets: Vec<BucketResult>,
    pub metadata: MetadataStore,
}

struct BucketState {
    parser: Arc<dyn TableParser>,
    incremental: bool,
}

/// Coordinates a multi-configuration run.
pub struct Executor {
    api: ApiDefinition,
    transport_builder: Arc<dyn TransportBuilder>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    child_concurrency: usize,
}

impl Executor {
    pub fn new(api: ApiDefinition) -> Self {
        Self {
            api,
            transport_builder: Arc::new(HttpTransportBuilder::new()),
            evaluator: Arc::new(UserFunctions::new()),
            child_concurrency: 1,
        }
    }

    pub fn with_transport_builder(mut self, builder: Arc<dyn TransportBuilder>) -> Self {
        self.transport_builder = builder;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_child_concurrency(mut self, concurrency: usize) -> Self {
        self.child_concurrency = concurrency.max(1);
        self
    }

    /// Run `configs` in order.
    ///
    /// The first failing configuration aborts the run and nothing is
    /// persisted, so the next run starts from the same snapshot.
    pub async fn run(
        &self,
        configs: &[ExtractorConfig],
        persistence: &dyn MetadataPersistence,
    ) -> Result<RunOutput> {
        let mut metadata = persistence.load()?;
        metadata.begin_run(Utc::now().timestamp());

        let cache = self
            .api
            .cache
            .as_ref()
            .map(|cache| ResponseCache::with_ttl_secs(cache.ttl));
        let mut buckets: IndexMap<Option<String>, BucketState> = IndexMap::new();

        for config in configs {
            let bucket = config.output_bucket(&self.api.name);
            let span = info_span!(
                "config",
                name = %config.name.as_deref().unwrap_or(""),
                bucket = %bucket.as_deref().unwrap_or("default")
            );

            let mut extractor = GenericExtractor::new(self.api.clone())
                .with_transport_builder(self.transport_builder.clone())
                .with_evaluator(self.evaluator.clone())
                .with_child_concurrency(self.child_concurrency);
            extractor.set_metadata(metadata);
            if let Some(cache) = &cache {
                extractor.enable_cache(cache.clone());
            }
            if let Some(state) = buckets.get(&bucket) {
                extractor.set_parser(state.parser.clone());
            }

            extractor.run(config).instrument(span).await?;

            if let Some(parser) = extractor.parser() {
                let state = buckets.entry(bucket).or_insert(BucketState {
                    parser,
                    incremental: false,
                });
                state.incremental |= config.incremental_output();
            }
            metadata = extractor.into_metadata();
        }

        metadata.finish_run();
        persistence.save(&metadata)?;

        let buckets: Vec<BucketResult> = buckets
            .into_iter()
            .map(|(bucket, state)| BucketResult {
                bucket,
                tables: state.parser.results(),
                incremental: state.incremental,
            })
            .collect();
        info!(
            configs = configs.len(),
            buckets = buckets.len(),
            "Run finished"
        );

        Ok(RunOutput { buckets, metadata })
    }
}
