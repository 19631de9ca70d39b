//! Flattening JSON parser.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::{ExtractorError, Result};
use crate::traits::parser::{ParentColumns, SchemaState, Table, TableParser};

/// Column for records that are not objects.
const SCALAR_COLUMN: &str = "data";

#[derive(Debug, Default)]
struct TableBuffer {
    columns: IndexSet<String>,
    rows: Vec<IndexMap<String, Value>>,
}

#[derive(Debug, Default)]
struct ParserState {
    schema: SchemaState,
    tables: IndexMap<String, TableBuffer>,
}

/// Turns JSON records into flat rows.
///
/// Nested objects become `parent_child` columns, arrays are kept as
/// JSON text. The type of every top-level field is recorded in the
/// schema state as `scalar`, `object` or `array`; a type already known
/// (from a previous run or an earlier record) is never replaced.
#[derive(Debug, Default)]
pub struct JsonParser {
    state: Mutex<ParserState>,
}

impl JsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from schema persisted by a previous run.
    pub fn with_schema(schema: SchemaState) -> Self {
        Self {
            state: Mutex::new(ParserState {
                schema,
                tables: IndexMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ParserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flatten(prefix: &str, value: &Value, row: &mut IndexMap<String, Value>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    Self::flatten(&format!("{}_{}", prefix, key), child, row);
                }
            }
            Value::Object(_) => {
                row.insert(prefix.to_string(), Value::Null);
            }
            Value::Array(_) => {
                row.insert(prefix.to_string(), Value::String(value.to_string()));
            }
            scalar => {
                row.insert(prefix.to_string(), scalar.clone());
            }
        }
    }

    fn type_of(value: &Value) -> Option<&'static str> {
        match value {
            Value::Null => None,
            Value::Object(_) => Some("object"),
            Value::Array(_) => Some("array"),
            _ => Some("scalar"),
        }
    }
}

impl TableParser for JsonParser {
    fn process(
        &self,
        records: &[Value],
        table: &str,
        parent_columns: &ParentColumns,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if table.is_empty() {
            return Err(ExtractorError::Parser {
                table: table.to_string(),
                message: "table name must not be empty".to_string(),
            });
        }

        let mut state = self.lock();
        let ParserState { schema, tables } = &mut *state;
        let table_schema = schema.entry(table.to_string()).or_default();
        let buffer = tables.entry(table.to_string()).or_default();

        for record in records {
            let mut row = IndexMap::new();
            match record {
                Value::Object(map) => {
                    for (key, value) in map {
                        if let Some(kind) = Self::type_of(value) {
                            table_schema
                                .entry(key.clone())
                                .or_insert_with(|| kind.to_string());
                        }
                        Self::flatten(key, value, &mut row);
                    }
                }
                other => {
                    if let Some(kind) = Self::type_of(other) {
                        table_schema
                            .entry(SCALAR_COLUMN.to_string())
                            .or_insert_with(|| kind.to_string());
                    }
                    Self::flatten(SCALAR_COLUMN, other, &mut row);
                }
            }

            for (key, value) in parent_columns {
                if let Some(kind) = Self::type_of(value) {
                    table_schema
                        .entry(key.clone())
                        .or_insert_with(|| kind.to_string());
                }
                row.insert(key.clone(), value.clone());
            }

            buffer.columns.extend(row.keys().cloned());
            buffer.rows.push(row);
        }

        debug!(table = %table, rows = records.len(), "Parsed records");
        Ok(())
    }

    fn schema_state(&self) -> SchemaState {
        self.lock().schema.clone()
    }

    fn results(&self) -> Vec<Table> {
        self.lock()
            .tables
            .iter()
            .map(|(name, buffer)| Table {
                name: name.clone(),
                columns: buffer.columns.iter().cloned().collect(),
                rows: buffer
                    .rows
                    .iter()
                    .map(|row| {
                        buffer
                            .columns
                            .iter()
                            .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect(),
            })
            .collect()
    }
}
