//! Expression evaluation seam.

use serde_json::Value;

use crate::error::Result;

/// Evaluates declared expressions against a bound context.
///
/// The context is a JSON object whose top-level keys (`attr`, `time`,
/// `placeholder`) are the roots an expression may reference. The engine
/// is agnostic to the expression grammar.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &Value, context: &Value) -> Result<Value>;

    /// Whether `value` is an expression rather than a literal.
    fn is_expression(&self, value: &Value) -> bool;
}
