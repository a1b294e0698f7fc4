//! Routing conditions.
//!
//! A condition decides, per lifecycle event, whether a bean is routed. Any
//! closure over the run works; configured `condition` strings are compiled
//! into [`ExpressionCondition`]s backed by the rhai expression engine.

use std::fmt;

use rhai::{Engine, Scope, AST};

use crate::error::ConditionError;
use crate::runtime::context::RunContext;

/// Pluggable routing condition.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, run: &RunContext) -> Result<bool, ConditionError>;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&RunContext) -> Result<bool, ConditionError> + Send + Sync,
{
    fn evaluate(&self, run: &RunContext) -> Result<bool, ConditionError> {
        self(run)
    }
}

/// Boolean expression over the run's beans.
///
/// Every bean is bound as a variable named by its bean id (JSON objects
/// become maps, so `coordinate.x > 100` works), along with every global
/// context field and `run_id`.
pub struct ExpressionCondition {
    expression: String,
    engine: Engine,
    ast: AST,
}

impl ExpressionCondition {
    /// Compile an expression.
    ///
    /// # Errors
    /// Returns `ConditionError` if the expression does not parse
    pub fn compile(expression: &str) -> Result<Self, ConditionError> {
        let engine = Engine::new();
        let ast = engine
            .compile_expression(expression)
            .map_err(|e| ConditionError(format!("Invalid condition '{}': {}", expression, e)))?;

        Ok(Self {
            expression: expression.to_string(),
            engine,
            ast,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn scope_for(run: &RunContext) -> Result<Scope<'static>, ConditionError> {
        let mut scope = Scope::new();

        for (key, value) in run.get_context_dict() {
            scope.push_constant(key.as_str(), value.clone());
        }

        for (bean_id, bean) in run.repository().get_all_as_map() {
            let value = rhai::serde::to_dynamic(bean)
                .map_err(|e| ConditionError(format!("Bean '{}' cannot be bound: {}", bean_id, e)))?;
            scope.push_dynamic(bean_id.as_str(), value);
        }

        scope.push_constant("run_id", run.run_id().to_string());
        Ok(scope)
    }
}

impl ConditionEvaluator for ExpressionCondition {
    fn evaluate(&self, run: &RunContext) -> Result<bool, ConditionError> {
        let mut scope = Self::scope_for(run)?;

        self.engine
            .eval_ast_with_scope::<bool>(&mut scope, &self.ast)
            .map_err(|e| ConditionError(format!("Condition '{}' failed: {}", self.expression, e)))
    }
}

impl fmt::Debug for ExpressionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionCondition")
            .field("expression", &self.expression)
            .finish()
    }
}
