//! Structural parser abstraction.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// Observed column types per table: `{ table: { column: type } }`.
pub type SchemaState = BTreeMap<String, BTreeMap<String, String>>;

/// Columns merged into every row of one job.
pub type ParentColumns = IndexMap<String, Value>;

/// A finalized output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }
}

/// Turns record arrays into rows of named tables.
///
/// Implementations are shared by every job of a configuration (and by
/// every configuration writing to the same bucket), so `process` must
/// be safe to call concurrently.
pub trait TableParser: Send + Sync {
    /// Append `records` to `table`, adding `parent_columns` to each row.
    fn process(&self, records: &[Value], table: &str, parent_columns: &ParentColumns)
        -> Result<()>;

    /// Schema observed so far, including any seeded state.
    fn schema_state(&self) -> SchemaState;

    /// Snapshot of all tables accumulated so far.
    fn results(&self) -> Vec<Table>;
}
