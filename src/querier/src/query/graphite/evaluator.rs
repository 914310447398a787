//! Recursive target evaluation
//!
//! Selectors go to the storage collaborator, function calls go through the
//! registry, and literals are only meaningful as function arguments.
//! Repeated sub-expressions are evaluated again; nothing is memoized.

use std::sync::Arc;

use common::model::TimeSeries;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::ast::Expr;
use super::context::EvaluationContext;
use super::error::{GraphiteError, GraphiteResult};
use super::functions::FunctionRegistry;
use crate::services::storage::MetricStore;

/// Walks expression trees. Holds no per-request state, so one instance
/// serves every concurrent request.
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn MetricStore>,
    registry: Arc<FunctionRegistry>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("store", &"MetricStore")
            .field("registry", &self.registry)
            .finish()
    }
}

impl Evaluator {
    pub fn new(store: Arc<dyn MetricStore>, registry: Arc<FunctionRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Check every call in the tree against the registry and its signature.
    ///
    /// Nothing is fetched; this lets malformed targets fail before any
    /// evaluation work is scheduled.
    pub fn validate(&self, expr: &Expr) -> GraphiteResult<()> {
        match expr {
            Expr::Selector(_) => Ok(()),
            Expr::Literal(literal) => Err(GraphiteError::NotASeries(literal.to_string())),
            Expr::Call(call) => {
                let function = self
                    .registry
                    .get(&call.name)
                    .ok_or_else(|| GraphiteError::UnknownFunction(call.name.clone()))?;
                function.validate(call)?;
                call.args
                    .iter()
                    .filter(|arg| matches!(arg, Expr::Call(_)))
                    .try_for_each(|arg| self.validate(arg))
            }
        }
    }

    /// Resolve one node to zero or more series.
    ///
    /// The request's cancellation token is checked before every node, so an
    /// abandoned request stops at the next step instead of running to the end.
    pub fn eval<'a>(
        &'a self,
        expr: &'a Expr,
        context: &'a EvaluationContext,
    ) -> BoxFuture<'a, GraphiteResult<Vec<TimeSeries>>> {
        async move {
            context.check_cancelled()?;

            match expr {
                Expr::Selector(selector) => {
                    let fetch = self.store.fetch(
                        context.tenant(),
                        &selector.pattern,
                        context.from(),
                        context.until(),
                    );
                    let series = tokio::select! {
                        biased;
                        _ = context.cancellation().cancelled() => return Err(GraphiteError::Cancelled),
                        result = fetch => result?,
                    };
                    tracing::trace!(
                        pattern = %selector.pattern,
                        matched = series.len(),
                        "Resolved selector"
                    );
                    Ok(series)
                }
                Expr::Literal(literal) => Err(GraphiteError::NotASeries(literal.to_string())),
                Expr::Call(call) => {
                    let function = self
                        .registry
                        .get(&call.name)
                        .ok_or_else(|| GraphiteError::UnknownFunction(call.name.clone()))?;
                    function.validate(call)?;
                    let series = function.evaluate(call, self, context).await?;
                    context.check_cancelled()?;
                    Ok(series)
                }
            }
        }
        .boxed()
    }
}
