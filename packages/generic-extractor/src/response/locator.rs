//! Locates the array of records inside a response body.

use serde_json::Value;
use tracing::warn;

use crate::response::value_at_path;

/// Records to process from `response`.
///
/// With a `data_field` the dotted path is followed and a non-array
/// target becomes a single record. Without one, a top-level array is
/// used as-is, an object's array property is used (the first in document
/// order when there are several), and an object holding no array is
/// one record.
pub fn find_records(response: &Value, data_field: Option<&str>, job_id: &str) -> Vec<Value> {
    if let Some(path) = data_field.filter(|p| !p.is_empty()) {
        return match value_at_path(response, path, ".") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => {
                warn!(job_id = %job_id, data_field = %path, "No data found at dataField");
                Vec::new()
            }
            Some(other) => vec![other.clone()],
        };
    }

    match response {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(map) => {
            let arrays: Vec<(&String, &Vec<Value>)> = map
                .iter()
                .filter_map(|(key, value)| value.as_array().map(|items| (key, items)))
                .collect();
            match arrays.as_slice() {
                [] => vec![response.clone()],
                [(_, items)] => (*items).clone(),
                [(key, items), ..] => {
                    warn!(
                        job_id = %job_id,
                        using = %key,
                        "Multiple arrays found in response, set dataField to choose one"
                    );
                    (*items).clone()
                }
            }
        }
        scalar => vec![scalar.clone()],
    }
}
