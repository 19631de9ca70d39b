//! Placeholder resolution against ancestor rows.
//!
//! A child job declares placeholders keyed by the token used in its
//! endpoint. An optional `N:` prefix on the key picks the ancestor level
//! (1 is the row that spawned the job, 2 its parent row, and so on):
//!
//! ```json
//! {
//!   "endpoint": "tickets/{2:ticket_id}/comments/{id}/attachments",
//!   "placeholders": {"2:ticket_id": "id", "id": "id"}
//! }
//! ```

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;
use tracing::warn;

use crate::config::PlaceholderSpec;
use crate::error::{ExtractorError, Result};
use crate::expression::scalar_to_string;
use crate::response::value_at_path;
use crate::traits::expression::ExpressionEvaluator;
use crate::traits::parser::ParentColumns;

const PARENT_PREFIX: &str = "parent_";

static UNRESOLVED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}/]+\}").expect("valid placeholder token pattern"));

/// Rows of every ancestor, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncestorChain {
    rows: Vec<Value>,
}

impl AncestorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain of a job spawned from `row` of a job whose chain is `self`.
    pub fn with_parent(&self, row: Value) -> Self {
        let mut rows = Vec::with_capacity(self.rows.len() + 1);
        rows.push(row);
        rows.extend(self.rows.iter().cloned());
        Self { rows }
    }

    /// Row at a 1-based level.
    pub fn get(&self, level: usize) -> Option<&Value> {
        level.checked_sub(1).and_then(|index| self.rows.get(index))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }
}

/// A resolved placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderBinding {
    /// Declared key, also the endpoint token
    pub name: String,

    /// Path read from the ancestor row
    pub source_path: String,

    pub value: Value,
}

pub type Bindings = IndexMap<String, PlaceholderBinding>;

/// Split `N:name` into its 1-based level.
fn level_of(name: &str) -> Result<usize> {
    let prefix = match name.split_once(':') {
        Some((prefix, _)) => prefix,
        None => return Ok(1),
    };
    match prefix.trim().parse::<usize>() {
        Ok(level) if level > 0 => Ok(level),
        _ => Err(ExtractorError::config(format!(
            "Invalid level '{}' in placeholder '{}', levels start at 1",
            prefix, name
        ))),
    }
}

/// Resolve one placeholder declaration against `ancestors`.
pub fn resolve(
    name: &str,
    spec: &PlaceholderSpec,
    ancestors: &AncestorChain,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<PlaceholderBinding> {
    let invalid = || {
        ExtractorError::config(format!(
            "The path for placeholder '{}' must be a string value or an object containing 'path' and 'function'.",
            name
        ))
    };

    let (path, transform) = match spec {
        PlaceholderSpec::Path(path) => (path.as_str(), None),
        PlaceholderSpec::Transform(map) => {
            let path = map.get("path").and_then(Value::as_str).ok_or_else(invalid)?;
            (path, Some(map))
        }
        PlaceholderSpec::Invalid(_) => return Err(invalid()),
    };

    let level = level_of(name)?;
    let row = ancestors
        .get(level)
        .ok_or_else(|| ExtractorError::LevelNotFound {
            placeholder: name.to_string(),
            level,
            max_level: ancestors.len(),
        })?;

    let raw = match value_at_path(row, path, ".") {
        Some(Value::Null) | None => {
            return Err(ExtractorError::ValueNotFound {
                placeholder: name.to_string(),
                path: path.to_string(),
                level,
                parents: ancestors.rows().to_vec(),
            })
        }
        Some(value) => value.clone(),
    };

    let value = match transform {
        Some(map) => {
            let expression: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| key.as_str() != "path")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            evaluator.evaluate(
                &Value::Object(expression),
                &json!({ "placeholder": { "value": raw } }),
            )?
        }
        None => raw,
    };

    Ok(PlaceholderBinding {
        name: name.to_string(),
        source_path: path.to_string(),
        value,
    })
}

/// Resolve every declaration of a child job.
pub fn resolve_all(
    placeholders: &IndexMap<String, PlaceholderSpec>,
    ancestors: &AncestorChain,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<Vec<PlaceholderBinding>> {
    placeholders
        .iter()
        .map(|(name, spec)| resolve(name, spec, ancestors, evaluator))
        .collect()
}

/// Inherited bindings overlaid with the child's own; same names take the child's value.
pub fn merge_bindings(inherited: &Bindings, own: Vec<PlaceholderBinding>) -> Bindings {
    let mut merged = inherited.clone();
    for binding in own {
        merged.insert(binding.name.clone(), binding);
    }
    merged
}

/// `parent_` + name, unless it already carries the prefix.
pub fn prepend_parent(name: &str) -> String {
    if name.starts_with(PARENT_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", PARENT_PREFIX, name)
    }
}

/// Columns attached to every row of a job: user parent id first, then one
/// `parent_<path>` column per binding.
pub fn parent_columns(user_parent_id: Option<&Map<String, Value>>, bindings: &Bindings) -> ParentColumns {
    let mut columns = ParentColumns::new();
    if let Some(user) = user_parent_id {
        columns.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    for binding in bindings.values() {
        columns.insert(prepend_parent(&binding.source_path), binding.value.clone());
    }
    columns
}

/// Substitute `{name}` tokens of `endpoint` with bound values.
pub fn template_endpoint(endpoint: &str, bindings: &Bindings, job_id: &str) -> String {
    let mut templated = endpoint.to_string();
    for binding in bindings.values() {
        templated = templated.replace(
            &format!("{{{}}}", binding.name),
            &scalar_to_string(&binding.value),
        );
    }

    if UNRESOLVED_TOKEN.is_match(&templated) {
        warn!(job_id = %job_id, endpoint = %templated, "Endpoint still contains unresolved placeholders");
    }
    templated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::UserFunctions;
    use proptest::prelude::*;

    fn chain(rows: &[Value]) -> AncestorChain {
        rows.iter()
            .rev()
            .fold(AncestorChain::new(), |chain, row| chain.with_parent(row.clone()))
    }

    fn path(p: &str) -> PlaceholderSpec {
        PlaceholderSpec::path(p)
    }

    #[test]
    fn test_with_parent_prepends() {
        let grandparent = AncestorChain::new().with_parent(json!({"id": "g"}));
        let parent = grandparent.with_parent(json!({"id": "p"}));
        assert_eq!(parent.rows(), &[json!({"id": "p"}), json!({"id": "g"})]);
        assert_eq!(grandparent.len(), 1);
    }

    #[test]
    fn test_level_addressing() {
        let ancestors = chain(&[json!({"id": "A"}), json!({"id": "B"})]);
        let evaluator = UserFunctions::new();

        let one = resolve("1:id", &path("id"), &ancestors, &evaluator).unwrap();
        assert_eq!(one.value, json!("A"));
        let plain = resolve("id", &path("id"), &ancestors, &evaluator).unwrap();
        assert_eq!(plain.value, json!("A"));
        let two = resolve("2:id", &path("id"), &ancestors, &evaluator).unwrap();
        assert_eq!(two.value, json!("B"));

        match resolve("3:id", &path("id"), &ancestors, &evaluator) {
            Err(err @ ExtractorError::LevelNotFound { .. }) => {
                assert_eq!(
                    err.to_string(),
                    "Level 3 not found in parent results! Maximum level: 2"
                );
            }
            other => panic!("expected LevelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_value() {
        let ancestors = chain(&[json!({"id": null, "user": {"name": "x"}})]);
        let evaluator = UserFunctions::new();

        assert!(matches!(
            resolve("id", &path("id"), &ancestors, &evaluator),
            Err(ExtractorError::ValueNotFound { level: 1, .. })
        ));
        let nested = resolve("user", &path("user.name"), &ancestors, &evaluator).unwrap();
        assert_eq!(nested.value, json!("x"));
        assert_eq!(nested.source_path, "user.name");
    }

    #[test]
    fn test_transform() {
        let ancestors = chain(&[json!({"id": 42})]);
        let spec = PlaceholderSpec::Transform(
            json!({"path": "id", "function": "concat", "args": ["t-", {"placeholder": "value"}]})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let binding = resolve("id", &spec, &ancestors, &UserFunctions::new()).unwrap();
        assert_eq!(binding.value, json!("t-42"));
    }

    #[test]
    fn test_malformed_declarations() {
        let ancestors = chain(&[json!({"id": 1})]);
        let evaluator = UserFunctions::new();

        let no_path = PlaceholderSpec::Transform(Map::new());
        assert!(matches!(
            resolve("id", &no_path, &ancestors, &evaluator),
            Err(ExtractorError::Config { .. })
        ));
        assert!(matches!(
            resolve("id", &PlaceholderSpec::Invalid(json!(5)), &ancestors, &evaluator),
            Err(ExtractorError::Config { .. })
        ));
        assert!(matches!(
            resolve("x:id", &path("id"), &ancestors, &evaluator),
            Err(ExtractorError::Config { .. })
        ));
    }

    #[test]
    fn test_merge_prefers_own_binding() {
        let mut inherited = Bindings::new();
        inherited.insert(
            "id".to_string(),
            PlaceholderBinding {
                name: "id".to_string(),
                source_path: "id".to_string(),
                value: json!(1),
            },
        );
        let merged = merge_bindings(
            &inherited,
            vec![PlaceholderBinding {
                name: "id".to_string(),
                source_path: "id".to_string(),
                value: json!(2),
            }],
        );
        assert_eq!(merged["id"].value, json!(2));
    }

    #[test]
    fn test_parent_columns_and_template() {
        let mut bindings = Bindings::new();
        bindings.insert(
            "1:id".to_string(),
            PlaceholderBinding {
                name: "1:id".to_string(),
                source_path: "id".to_string(),
                value: json!(7),
            },
        );
        let user = json!({"job_parent_id": "acme"}).as_object().cloned().unwrap();

        let columns = parent_columns(Some(&user), &bindings);
        assert_eq!(
            columns.keys().collect::<Vec<_>>(),
            vec!["job_parent_id", "parent_id"]
        );
        assert_eq!(
            template_endpoint("tickets/{1:id}/comments", &bindings, "comments"),
            "tickets/7/comments"
        );
    }

    proptest! {
        #[test]
        fn prop_prepend_parent_is_idempotent(name in "[a-z_]{0,12}") {
            let once = prepend_parent(&name);
            prop_assert!(once.starts_with("parent_"));
            prop_assert_eq!(prepend_parent(&once), once);
        }

        #[test]
        fn prop_level_addresses_nth_ancestor(depth in 1usize..6, level in 1usize..8) {
            let rows: Vec<Value> = (1..=depth).map(|n| json!({"n": n})).collect();
            let ancestors = chain(&rows);
            let result = resolve(&format!("{}:n", level), &path("n"), &ancestors, &UserFunctions::new());
            if level <= depth {
                prop_assert_eq!(result.unwrap().value, json!(level));
            } else {
                let is_level_error = matches!(
                    result,
                    Err(ExtractorError::LevelNotFound { max_level, .. }) if max_level == depth
                );
                prop_assert!(is_level_error);
            }
        }
    }
}
