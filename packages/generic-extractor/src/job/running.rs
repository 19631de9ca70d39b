//! The recursive extraction job.

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::JobSpec;
use crate::error::{ExtractorError, Result};
use crate::expression::build_values;
use crate::job::placeholder::{
    merge_bindings, parent_columns, resolve_all, template_endpoint, AncestorChain, Bindings,
};
use crate::job::LogContext;
use crate::pagination::{PageVerdict, PaginationDriver};
use crate::response::{filter_response, find_records, RecordFilter};
use crate::traits::expression::ExpressionEvaluator;
use crate::traits::parser::TableParser;
use crate::traits::scroller::{RequestTemplate, ScrollerFactory};
use crate::traits::transport::Transport;

const INVALID_USER_DATA: &str =
    "User defined parent ID must be a key:value pair, or multiple such pairs.";

/// Resources shared by every job of one configuration.
#[derive(Clone)]
pub struct JobContext {
    pub transport: Arc<dyn Transport>,
    pub parser: Arc<dyn TableParser>,
    pub scrollers: Arc<dyn ScrollerFactory>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,

    /// Configuration attributes, the `attr` expression root
    pub attributes: Map<String, Value>,

    /// The `time` expression root
    pub time: Value,

    /// Cancelled by the first failing job; nothing starts afterwards
    pub cancel: CancellationToken,

    /// Maximum child jobs in flight per page
    pub child_concurrency: usize,

    pub log: LogContext,
}

impl JobContext {
    fn expression_context(&self) -> Value {
        json!({ "attr": self.attributes, "time": self.time })
    }
}

/// One running instance of a [`JobSpec`].
///
/// Owns its ancestor rows, inherited placeholder bindings and pagination
/// state. Children are built fresh per spawning row.
pub struct ExtractionJob<'a> {
    spec: &'a JobSpec,
    ancestors: AncestorChain,
    bindings: Bindings,

    /// Configuration-level user data; top-level jobs only
    config_user_data: Option<Map<String, Value>>,

    driver: PaginationDriver,
}

impl<'a> ExtractionJob<'a> {
    /// A job started directly by the orchestrator.
    pub fn top_level(
        spec: &'a JobSpec,
        config_user_data: Option<&Value>,
        scrollers: &dyn ScrollerFactory,
    ) -> Result<Self> {
        let config_user_data = config_user_data
            .map(|value| user_data_map(value, "userData"))
            .transpose()?;
        Ok(Self {
            spec,
            ancestors: AncestorChain::new(),
            bindings: Bindings::new(),
            config_user_data,
            driver: PaginationDriver::new(scrollers.create()),
        })
    }

    fn child(
        spec: &'a JobSpec,
        ancestors: AncestorChain,
        bindings: Bindings,
        scrollers: &dyn ScrollerFactory,
    ) -> Self {
        Self {
            spec,
            ancestors,
            bindings,
            config_user_data: None,
            driver: PaginationDriver::new(scrollers.create()),
        }
    }

    pub fn job_id(&self) -> &str {
        self.spec.job_id()
    }

    /// Run the pagination loop and every child job.
    ///
    /// The first failure cancels the shared token and is returned tagged
    /// with this job unless a deeper job already tagged it.
    pub fn run(self, ctx: &'a JobContext) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut job = self;
            let job_id = job.spec.job_id().to_string();
            let endpoint = template_endpoint(&job.spec.endpoint, &job.bindings, &job_id);

            if ctx.cancel.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }

            let result = job.paginate(ctx, &job_id, &endpoint).await;
            if let Err(err) = &result {
                if !matches!(err, ExtractorError::Job { .. } | ExtractorError::Cancelled) {
                    error!(
                        config = %ctx.log.config_name,
                        job_id = %job_id,
                        endpoint = %endpoint,
                        error = %err,
                        "Job failed"
                    );
                }
                ctx.cancel.cancel();
            }
            result.map_err(|err| err.in_job(&job_id, &endpoint))
        }
        .boxed()
    }

    async fn paginate(&mut self, ctx: &'a JobContext, job_id: &str, endpoint: &str) -> Result<()> {
        let expression_context = ctx.expression_context();
        let params = build_values(ctx.evaluator.as_ref(), &self.spec.params, &expression_context)?;
        let template = RequestTemplate {
            job_id: job_id.to_string(),
            endpoint: endpoint.to_string(),
            method: self.spec.method,
            params,
        };

        let user_parent_id = self.user_parent_id(ctx, &expression_context)?;
        let parent_cols = parent_columns(user_parent_id.as_ref(), &self.bindings);
        let table = self.spec.data_type();

        let mut next = self.driver.first_request(&template);
        while let Some(request) = next {
            if ctx.cancel.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }

            if ctx.log.verbose {
                info!(
                    config = %ctx.log.config_name,
                    job_id = %job_id,
                    endpoint = %request.endpoint,
                    method = ?request.method,
                    params = ?request.params,
                    "Requesting page"
                );
            } else {
                debug!(job_id = %job_id, endpoint = %request.endpoint, "Requesting page");
            }

            let response = ctx.transport.download(&request).await?;
            if self.driver.check_page(&response) == PageVerdict::Duplicate {
                debug!(job_id = %job_id, "Job finished when last response matched the previous");
                break;
            }

            let records = find_records(&response, self.spec.data_field.as_deref(), job_id);
            let records = filter_response(
                records,
                self.spec.response_filter.as_ref(),
                self.spec.response_filter_delimiter.as_deref(),
            )?;

            ctx.parser.process(&records, &table, &parent_cols)?;
            self.run_children(ctx, &records).await?;

            next = self.driver.next_request(&template, &response, &records);
        }
        Ok(())
    }

    /// Merged user data of this job, evaluated against `attr` and `time`.
    fn user_parent_id(
        &self,
        ctx: &JobContext,
        expression_context: &Value,
    ) -> Result<Option<Map<String, Value>>> {
        let job_user_data = self
            .spec
            .user_data
            .as_ref()
            .map(|value| user_data_map(value, "job_parent_id"))
            .transpose()?;

        let merged = match (&self.config_user_data, job_user_data) {
            (None, None) => return Ok(None),
            (Some(config), None) => config.clone(),
            (None, Some(job)) => job,
            (Some(config), Some(job)) => {
                let mut merged = config.clone();
                merged.extend(job);
                merged
            }
        };

        build_values(ctx.evaluator.as_ref(), &merged, expression_context).map(Some)
    }

    async fn run_children(&self, ctx: &'a JobContext, records: &[Value]) -> Result<()> {
        if self.spec.children.is_empty() || records.is_empty() {
            return Ok(());
        }

        let mut spawns = Vec::new();
        for (index, child) in self.spec.children.iter().enumerate() {
            if child.placeholders.is_empty() {
                warn!(job_id = %child.job_id(), "No placeholders set for child job");
            }
            let filter = child
                .recursion_filter
                .as_deref()
                .map(RecordFilter::parse)
                .transpose()?;
            for row in records {
                if filter.as_ref().is_some_and(|filter| !filter.matches(row)) {
                    continue;
                }
                spawns.push((index, row.clone()));
            }
        }

        let parent = self;
        let spec: &'a JobSpec = self.spec;
        let mut results = stream::iter(spawns)
            .map(move |(index, row)| async move {
                if ctx.cancel.is_cancelled() {
                    return Err(ExtractorError::Cancelled);
                }
                let child = &spec.children[index];
                let job = parent.spawn(child, &row, ctx).map_err(|err| {
                    error!(
                        config = %ctx.log.config_name,
                        job_id = %child.job_id(),
                        endpoint = %child.endpoint,
                        error = %err,
                        "Could not build child job"
                    );
                    ctx.cancel.cancel();
                    err.in_job(child.job_id(), &child.endpoint)
                })?;
                job.run(ctx).await
            })
            .buffer_unordered(ctx.child_concurrency.max(1));

        let mut cancelled = false;
        while let Some(result) = results.next().await {
            match result {
                Ok(()) => {}
                Err(ExtractorError::Cancelled) => cancelled = true,
                Err(err) => return Err(err),
            }
        }
        if cancelled {
            return Err(ExtractorError::Cancelled);
        }
        Ok(())
    }

    /// Build the child job spawned by `row`.
    fn spawn(&self, child: &'a JobSpec, row: &Value, ctx: &JobContext) -> Result<ExtractionJob<'a>> {
        let ancestors = self.ancestors.with_parent(row.clone());
        let own = resolve_all(&child.placeholders, &ancestors, ctx.evaluator.as_ref())?;
        let bindings = merge_bindings(&self.bindings, own);
        Ok(ExtractionJob::child(
            child,
            ancestors,
            bindings,
            ctx.scrollers.as_ref(),
        ))
    }
}

/// User data declaration as a key/value map.
fn user_data_map(value: &Value, scalar_key: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Array(_) => Err(ExtractorError::config(INVALID_USER_DATA)),
        Value::Null => Ok(Map::new()),
        scalar => {
            let mut map = Map::new();
            map.insert(scalar_key.to_string(), scalar.clone());
            Ok(map)
        }
    }
}
