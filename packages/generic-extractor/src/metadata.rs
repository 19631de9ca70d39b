//! Cross-run state: parser schema and the incremental time window.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ExtractorError, Result};
use crate::traits::metadata::MetadataPersistence;
use crate::traits::parser::SchemaState;

/// Start times used for incremental filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Start of the previous successful run (unix seconds)
    #[serde(default)]
    pub previous_start: i64,

    /// Start of the current run, only set while a run is in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_start: Option<i64>,
}

/// Metadata loaded before a run and persisted once after it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataStore {
    /// Parser schema by table
    #[serde(rename = "json_parser.struct", default)]
    pub schema: SchemaState,

    #[serde(default)]
    pub time: TimeWindow,

    /// Keys this version does not interpret, kept as they were
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a run at `now`.
    pub fn begin_run(&mut self, now: i64) {
        self.time.current_start = Some(now);
    }

    /// Roll the window forward: the current start becomes the previous one.
    pub fn finish_run(&mut self) {
        if let Some(current) = self.time.current_start.take() {
            self.time.previous_start = current;
        }
    }

    /// Fold observed schema in. Later observations win per column.
    pub fn merge_schema(&mut self, observed: SchemaState) {
        for (table, columns) in observed {
            self.schema.entry(table).or_default().extend(columns);
        }
    }

    /// The `time` root available to expressions.
    pub fn time_context(&self) -> Value {
        let mut time = json!({ "previousStart": self.time.previous_start });
        if let Some(current) = self.time.current_start {
            time["currentStart"] = json!(current);
        }
        time
    }
}

/// Metadata persisted as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileMetadata {
    path: PathBuf,
}

impl JsonFileMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataPersistence for JsonFileMetadata {
    fn load(&self) -> Result<MetadataStore> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No metadata snapshot, starting empty");
            return Ok(MetadataStore::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| ExtractorError::Metadata(Box::new(e)))?;
        if raw.trim().is_empty() {
            return Ok(MetadataStore::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, metadata: &MetadataStore) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ExtractorError::Metadata(Box::new(e)))?;
        }
        let raw = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&self.path, raw).map_err(|e| ExtractorError::Metadata(Box::new(e)))?;
        debug!(path = %self.path.display(), "Metadata snapshot saved");
        Ok(())
    }
}
