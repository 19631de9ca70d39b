//! User functions for params, headers, user data and placeholder transforms.
//!
//! An expression is a JSON object:
//!
//! ```json
//! {"function": "concat", "args": ["Bearer ", {"attr": "token"}]}
//! ```
//!
//! `{"attr": "path"}`, `{"time": "path"}` and `{"placeholder": "value"}`
//! read from the bound context. Anything else is a literal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt::Write;

use crate::error::{ExtractorError, Result};
use crate::response::value_at_path;
use crate::traits::expression::ExpressionEvaluator;

/// Context roots an expression may reference.
const REFERENCE_ROOTS: &[&str] = &["attr", "time", "placeholder"];

/// Default [`ExpressionEvaluator`].
#[derive(Debug, Clone, Default)]
pub struct UserFunctions;

impl UserFunctions {
    pub fn new() -> Self {
        Self
    }

    fn reference<'a>(map: &'a Map<String, Value>) -> Option<(&'a str, &'a str)> {
        if map.len() != 1 {
            return None;
        }
        let (root, path) = map.iter().next()?;
        if !REFERENCE_ROOTS.contains(&root.as_str()) {
            return None;
        }
        Some((root.as_str(), path.as_str()?))
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "concat" => Ok(Value::String(
                args.iter().map(scalar_to_string).collect::<String>(),
            )),
            "implode" => {
                let glue = args.first().map(scalar_to_string).unwrap_or_default();
                let items = match args.get(1) {
                    Some(Value::Array(items)) => items,
                    _ => return Err(arg_error(name, "an array as second argument")),
                };
                Ok(Value::String(
                    items.iter().map(scalar_to_string).collect::<Vec<_>>().join(&glue),
                ))
            }
            "urlencode" => {
                let raw = args.first().ok_or_else(|| arg_error(name, "one argument"))?;
                Ok(Value::String(
                    urlencoding::encode(&scalar_to_string(raw)).into_owned(),
                ))
            }
            "base64_encode" => {
                let raw = args.first().ok_or_else(|| arg_error(name, "one argument"))?;
                Ok(Value::String(STANDARD.encode(scalar_to_string(raw))))
            }
            "ifempty" => {
                let value = args.first().cloned().unwrap_or(Value::Null);
                if is_empty(&value) {
                    Ok(args.get(1).cloned().unwrap_or(Value::Null))
                } else {
                    Ok(value)
                }
            }
            "date" => {
                let format = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| arg_error(name, "a format string"))?;
                let timestamp = match args.get(1) {
                    Some(value) => value
                        .as_i64()
                        .ok_or_else(|| arg_error(name, "an integer timestamp"))?,
                    None => Utc::now().timestamp(),
                };
                let moment = DateTime::<Utc>::from_timestamp(timestamp, 0)
                    .ok_or_else(|| arg_error(name, "a timestamp in range"))?;
                let mut out = String::new();
                write!(out, "{}", moment.format(format))
                    .map_err(|_| arg_error(name, "a valid strftime format"))?;
                Ok(Value::String(out))
            }
            other => Err(ExtractorError::expression(format!(
                "Function '{}' is not allowed",
                other
            ))),
        }
    }
}

fn arg_error(function: &str, expected: &str) -> ExtractorError {
    ExtractorError::expression(format!("Function '{}' expects {}", function, expected))
}

impl ExpressionEvaluator for UserFunctions {
    fn evaluate(&self, expression: &Value, context: &Value) -> Result<Value> {
        let map = match expression {
            Value::Object(map) => map,
            literal => return Ok(literal.clone()),
        };

        if let Some(name) = map.get("function") {
            let name = name
                .as_str()
                .ok_or_else(|| ExtractorError::expression("'function' must be a string"))?;
            let args = match map.get("args") {
                None => Vec::new(),
                Some(Value::Array(args)) => args
                    .iter()
                    .map(|arg| self.evaluate(arg, context))
                    .collect::<Result<Vec<_>>>()?,
                Some(_) => {
                    return Err(ExtractorError::expression(format!(
                        "'args' of function '{}' must be an array",
                        name
                    )))
                }
            };
            return self.call(name, &args);
        }

        if let Some((root, path)) = Self::reference(map) {
            return context
                .get(root)
                .and_then(|scope| value_at_path(scope, path, "."))
                .cloned()
                .ok_or_else(|| {
                    ExtractorError::expression(format!("'{}.{}' is not defined", root, path))
                });
        }

        Ok(expression.clone())
    }

    fn is_expression(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => map.contains_key("function") || Self::reference(map).is_some(),
            _ => false,
        }
    }
}

/// Evaluate every expression value in `values`, keeping literals.
pub fn build_values(
    evaluator: &dyn ExpressionEvaluator,
    values: &Map<String, Value>,
    context: &Value,
) -> Result<Map<String, Value>> {
    values
        .iter()
        .map(|(key, value)| {
            let built = if evaluator.is_expression(value) {
                evaluator.evaluate(value, context)?
            } else {
                value.clone()
            };
            Ok((key.clone(), built))
        })
        .collect()
}

/// Text form of a value as it appears in URLs, headers and columns.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Null, an empty string, an empty array or an empty object.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
