//! Response shaping: locating records and filtering them.

pub mod filter;
pub mod locator;

use serde_json::Value;

pub use filter::{filter_response, RecordFilter};
pub use locator::find_records;

/// Follow a `delimiter`-separated path into `value`.
///
/// Object keys are matched by name and array elements by index. An
/// empty path addresses `value` itself.
pub fn value_at_path<'a>(value: &'a Value, path: &str, delimiter: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split(delimiter).try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
