//! Structural parser implementations.

mod json;

pub use json::JsonParser;

// Re-export from traits for convenience
pub use crate::traits::parser::{ParentColumns, SchemaState, Table, TableParser};
