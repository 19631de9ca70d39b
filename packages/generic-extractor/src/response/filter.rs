//! Record filters.
//!
//! A filter is one or more conditions joined by `&` (all must hold) or
//! `|` (any may hold):
//!
//! ```text
//! status!=deleted&type==ticket
//! priority>3|tags~~urgent
//! ```
//!
//! Response filters drop the records they match; recursion filters keep
//! only the records they match as spawn sources for a child job.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::config::FilterDeclaration;
use crate::error::{ExtractorError, Result};
use crate::expression::scalar_to_string;
use crate::response::value_at_path;

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.+?)\s*(==|!=|~~|<|>)\s*(.*?)\s*$").expect("valid filter condition pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    All,
    Any,
}

#[derive(Debug, Clone)]
struct Condition {
    path: String,
    operator: Operator,
    value: String,
}

impl Condition {
    fn matches(&self, record: &Value, delimiter: &str) -> bool {
        let actual = match value_at_path(record, &self.path, delimiter) {
            Some(Value::Null) | None => return self.operator == Operator::Ne,
            Some(actual) => scalar_to_string(actual),
        };
        match self.operator {
            Operator::Eq => actual == self.value,
            Operator::Ne => actual != self.value,
            Operator::Contains => actual.contains(&self.value),
            Operator::Lt | Operator::Gt => {
                let ordering = match (actual.parse::<f64>(), self.value.parse::<f64>()) {
                    (Ok(a), Ok(b)) => a.partial_cmp(&b),
                    _ => Some(actual.as_str().cmp(self.value.as_str())),
                };
                match ordering {
                    Some(std::cmp::Ordering::Less) => self.operator == Operator::Lt,
                    Some(std::cmp::Ordering::Greater) => self.operator == Operator::Gt,
                    _ => false,
                }
            }
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    conditions: Vec<Condition>,
    combinator: Combinator,
    delimiter: String,
}

impl RecordFilter {
    pub fn parse(expression: &str) -> Result<Self> {
        let (combinator, parts): (Combinator, Vec<&str>) =
            match (expression.contains('&'), expression.contains('|')) {
                (true, true) => {
                    return Err(ExtractorError::config(format!(
                        "Filter '{}' cannot mix '&' and '|'",
                        expression
                    )))
                }
                (false, true) => (Combinator::Any, expression.split('|').collect()),
                _ => (Combinator::All, expression.split('&').collect()),
            };

        let conditions = parts
            .into_iter()
            .map(|part| {
                let captures = CONDITION.captures(part).ok_or_else(|| {
                    ExtractorError::config(format!(
                        "Invalid filter condition '{}' in '{}'",
                        part, expression
                    ))
                })?;
                let operator = match &captures[2] {
                    "==" => Operator::Eq,
                    "!=" => Operator::Ne,
                    "<" => Operator::Lt,
                    ">" => Operator::Gt,
                    _ => Operator::Contains,
                };
                Ok(Condition {
                    path: captures[1].to_string(),
                    operator,
                    value: captures[3].to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            conditions,
            combinator,
            delimiter: ".".to_string(),
        })
    }

    /// Separator for nested field names, `.` by default.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        let mut results = self
            .conditions
            .iter()
            .map(|condition| condition.matches(record, &self.delimiter));
        match self.combinator {
            Combinator::All => results.all(|matched| matched),
            Combinator::Any => results.any(|matched| matched),
        }
    }
}

/// Drop every record matched by any of the declared response filters.
pub fn filter_response(
    records: Vec<Value>,
    declaration: Option<&FilterDeclaration>,
    delimiter: Option<&str>,
) -> Result<Vec<Value>> {
    let declaration = match declaration {
        Some(declaration) => declaration,
        None => return Ok(records),
    };

    let filters = declaration
        .expressions()
        .into_iter()
        .map(|expression| {
            let filter = RecordFilter::parse(expression)?;
            Ok(match delimiter {
                Some(delimiter) => filter.with_delimiter(delimiter),
                None => filter,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(records
        .into_iter()
        .filter(|record| !filters.iter().any(|filter| filter.matches(record)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality() {
        let filter = RecordFilter::parse("status==open").unwrap();
        assert!(filter.matches(&json!({"status": "open"})));
        assert!(!filter.matches(&json!({"status": "closed"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn test_not_equal_matches_missing_field() {
        let filter = RecordFilter::parse("status != deleted").unwrap();
        assert!(filter.matches(&json!({"status": "open"})));
        assert!(filter.matches(&json!({})));
        assert!(!filter.matches(&json!({"status": "deleted"})));
    }

    #[test]
    fn test_numeric_comparison() {
        let filter = RecordFilter::parse("priority>3").unwrap();
        assert!(filter.matches(&json!({"priority": 10})));
        assert!(!filter.matches(&json!({"priority": 2})));
        assert!(!filter.matches(&json!({"priority": 3})));
    }

    #[test]
    fn test_combinators() {
        let all = RecordFilter::parse("type==ticket&status==open").unwrap();
        assert!(all.matches(&json!({"type": "ticket", "status": "open"})));
        assert!(!all.matches(&json!({"type": "ticket", "status": "closed"})));

        let any = RecordFilter::parse("tags~~urgent|priority>5").unwrap();
        assert!(any.matches(&json!({"tags": ["urgent"], "priority": 1})));
        assert!(any.matches(&json!({"tags": [], "priority": 9})));
        assert!(!any.matches(&json!({"tags": [], "priority": 1})));
    }

    #[test]
    fn test_mixed_combinators_rejected() {
        assert!(matches!(
            RecordFilter::parse("a==1&b==2|c==3"),
            Err(ExtractorError::Config { .. })
        ));
        assert!(RecordFilter::parse("no operator here").is_err());
    }

    #[test]
    fn test_nested_field_with_delimiter() {
        let filter = RecordFilter::parse("via/channel==email")
            .unwrap()
            .with_delimiter("/");
        assert!(filter.matches(&json!({"via": {"channel": "email"}})));
    }

    #[test]
    fn test_filter_response_removes_matches() {
        let records = vec![
            json!({"id": 1, "role": "bot"}),
            json!({"id": 2, "role": "human"}),
            json!({"id": 3, "active": false}),
        ];
        let declaration =
            FilterDeclaration::Many(vec!["role==bot".to_string(), "active==false".to_string()]);
        let kept = filter_response(records, Some(&declaration), None).unwrap();
        assert_eq!(kept, vec![json!({"id": 2, "role": "human"})]);
    }
}
