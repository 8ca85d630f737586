//! Expression evaluation.
//!
//! Derived schemas, object links and mandatory conditions are expressions
//! evaluated against an entity. Evaluation runs in a sandboxed Rhai engine
//! with operation, call depth and string size limits.

use std::collections::BTreeMap;

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ExpressionLimits;
use crate::error::{ProvisioningError, Result};

/// Variables visible to an expression.
///
/// Every variable is also reachable through the `attrs` map, which is the
/// only way to read names that are not valid identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionContext {
    vars: BTreeMap<String, Value>,
}

impl ExpressionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

/// Evaluates expressions to strings.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` against `context`.
    ///
    /// A unit or null result renders as the empty string.
    fn evaluate(&self, expression: &str, context: &ExpressionContext) -> Result<String>;

    /// Evaluate a condition; only a result rendering as `true` holds.
    fn is_true(&self, expression: &str, context: &ExpressionContext) -> bool {
        match self.evaluate(expression, context) {
            Ok(result) => result.trim().eq_ignore_ascii_case("true"),
            Err(e) => {
                warn!(expression, error = %e, "Condition evaluation failed");
                false
            }
        }
    }
}

/// Rhai-backed evaluator.
pub struct RhaiExpressionEvaluator {
    engine: Engine,
}

impl std::fmt::Debug for RhaiExpressionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiExpressionEvaluator").finish_non_exhaustive()
    }
}

impl Default for RhaiExpressionEvaluator {
    fn default() -> Self {
        Self::new(&ExpressionLimits::default())
    }
}

impl RhaiExpressionEvaluator {
    #[must_use]
    pub fn new(limits: &ExpressionLimits) -> Self {
        let mut engine = Engine::new();

        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(10_000);

        engine.register_fn("log_info", |msg: &str| {
            info!(target: "idsync::expression", "{}", msg);
        });
        engine.register_fn("log_debug", |msg: &str| {
            debug!(target: "idsync::expression", "{}", msg);
        });

        Self { engine }
    }

    fn build_scope(context: &ExpressionContext) -> Scope<'static> {
        let mut scope = Scope::new();
        let mut attrs = rhai::Map::new();

        for (name, value) in context.iter() {
            let dynamic = rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT);
            attrs.insert(name.as_str().into(), dynamic.clone());
            if is_identifier(name) {
                scope.push_constant(name.clone(), dynamic);
            }
        }
        scope.push_constant("attrs", attrs);

        scope
    }
}

impl ExpressionEvaluator for RhaiExpressionEvaluator {
    fn evaluate(&self, expression: &str, context: &ExpressionContext) -> Result<String> {
        let mut scope = Self::build_scope(context);
        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, expression)
            .map_err(|e| ProvisioningError::expression(format!("{expression}: {e}")))?;

        if result.is_unit() {
            return Ok(String::new());
        }
        Ok(result.to_string())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
