//! Function contract and registry
//!
//! Every transformation is a [`SeriesFunction`]: a static `validate` over the
//! unevaluated arguments, and an `evaluate` that recursively evaluates its
//! series arguments through the [`Evaluator`] and computes output series.
//! Adding a function means registering it; the parser and evaluator never
//! change.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::model::TimeSeries;

use super::ast::{ArgKind, Expr, FunctionCall};
use super::context::EvaluationContext;
use super::error::{GraphiteError, GraphiteResult};
use super::evaluator::Evaluator;

pub mod aggregate;
pub mod alias;
pub mod filter;
pub mod transform;

/// Arity and per-position argument kinds of a function.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Positions that must be present
    pub required: &'static [ArgKind],
    /// Positions that may follow the required ones
    pub optional: &'static [ArgKind],
    /// Kind of any further arguments, if the function is variadic
    pub variadic: Option<ArgKind>,
}

impl Signature {
    pub const fn exact(required: &'static [ArgKind]) -> Self {
        Self {
            required,
            optional: &[],
            variadic: None,
        }
    }

    pub const fn with_optional(
        required: &'static [ArgKind],
        optional: &'static [ArgKind],
    ) -> Self {
        Self {
            required,
            optional,
            variadic: None,
        }
    }

    pub const fn variadic(required: &'static [ArgKind], rest: ArgKind) -> Self {
        Self {
            required,
            optional: &[],
            variadic: Some(rest),
        }
    }

    fn expectation(&self) -> String {
        let min = self.required.len();
        let max = min + self.optional.len();
        match (self.variadic, min == max) {
            (Some(_), _) => format!("at least {}", spell(min)),
            (None, true) => spell(min),
            (None, false) => format!("between {} and {}", spell(min), spell(max)),
        }
    }

    fn kind_at(&self, index: usize) -> Option<ArgKind> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .nth(index)
            .copied()
            .or(self.variadic)
    }

    /// Check arity and argument kinds without evaluating anything.
    pub fn check(&self, function: &str, args: &[Expr]) -> GraphiteResult<()> {
        let min = self.required.len();
        let max = min + self.optional.len();
        let count = args.len();
        if count < min || (self.variadic.is_none() && count > max) {
            return Err(GraphiteError::invalid_argument(
                function,
                format!(
                    "number of arguments is {count}. Must be {}.",
                    self.expectation()
                ),
            ));
        }

        for (index, arg) in args.iter().enumerate() {
            let Some(expected) = self.kind_at(index) else {
                continue;
            };
            if arg.kind() != expected {
                return Err(GraphiteError::invalid_argument(
                    function,
                    format!(
                        "argument {} is {} ({arg}). Must be {expected}.",
                        index + 1,
                        arg.kind()
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn spell(n: usize) -> String {
    match n {
        0 => "zero".to_string(),
        1 => "one".to_string(),
        2 => "two".to_string(),
        3 => "three".to_string(),
        n => n.to_string(),
    }
}

/// Contract every registered function satisfies.
#[async_trait]
pub trait SeriesFunction: Send + Sync {
    fn signature(&self) -> Signature;

    /// Static check of the unevaluated arguments; runs before any recursion.
    fn validate(&self, call: &FunctionCall) -> GraphiteResult<()> {
        self.signature().check(&call.name, &call.args)
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>>;
}

/// Immutable name → implementation mapping, built once at start-up.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn SeriesFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard function catalogue.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        // Aggregating combinators
        let average: Arc<dyn SeriesFunction> = Arc::new(aggregate::AverageSeries);
        registry.register("averageSeries", average.clone());
        registry.register("avg", average);
        let sum: Arc<dyn SeriesFunction> = Arc::new(aggregate::AggregateSeries::sum());
        registry.register("sumSeries", sum.clone());
        registry.register("sum", sum);
        registry.register("maxSeries", Arc::new(aggregate::AggregateSeries::max()));
        registry.register("minSeries", Arc::new(aggregate::AggregateSeries::min()));
        registry.register("diffSeries", Arc::new(aggregate::AggregateSeries::diff()));
        registry.register("rangeSeries", Arc::new(aggregate::AggregateSeries::range()));

        // Per-series transforms
        registry.register("scale", Arc::new(transform::Scale));
        registry.register("offset", Arc::new(transform::Offset));
        registry.register("absolute", Arc::new(transform::Absolute));
        registry.register("derivative", Arc::new(transform::Derivative));
        registry.register(
            "nonNegativeDerivative",
            Arc::new(transform::NonNegativeDerivative),
        );
        registry.register("transformNull", Arc::new(transform::TransformNull));

        // Filters
        registry.register("currentAbove", Arc::new(filter::ValueFilter::current_above()));
        registry.register("currentBelow", Arc::new(filter::ValueFilter::current_below()));
        registry.register("averageAbove", Arc::new(filter::ValueFilter::average_above()));
        registry.register("averageBelow", Arc::new(filter::ValueFilter::average_below()));
        registry.register("exclude", Arc::new(filter::NameFilter::exclude()));
        registry.register("grep", Arc::new(filter::NameFilter::grep()));
        registry.register("limit", Arc::new(filter::Limit));

        // Renaming
        registry.register("alias", Arc::new(alias::Alias));
        registry.register("aliasByNode", Arc::new(alias::AliasByNode));
        registry.register("aliasSub", Arc::new(alias::AliasSub));
        registry.register("legendValue", Arc::new(alias::LegendValue));

        registry
    }

    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn SeriesFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SeriesFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Evaluate every series-kind argument in order and concatenate the results.
pub(crate) async fn eval_series_args(
    call: &FunctionCall,
    evaluator: &Evaluator,
    context: &EvaluationContext,
) -> GraphiteResult<Vec<TimeSeries>> {
    let mut series = Vec::new();
    for arg in call.args.iter().filter(|a| a.kind() == ArgKind::Series) {
        series.extend(evaluator.eval(arg, context).await?);
    }
    Ok(series)
}

/// Number literal at `index`; `validate` has already checked the kind.
pub(crate) fn number_arg(call: &FunctionCall, index: usize) -> GraphiteResult<f64> {
    call.args
        .get(index)
        .and_then(Expr::as_number)
        .ok_or_else(|| {
            GraphiteError::invalid_argument(
                &call.name,
                format!("argument {} must be a number", index + 1),
            )
        })
}

/// String literal at `index`; `validate` has already checked the kind.
pub(crate) fn string_arg(call: &FunctionCall, index: usize) -> GraphiteResult<&str> {
    call.args
        .get(index)
        .and_then(Expr::as_str)
        .ok_or_else(|| {
            GraphiteError::invalid_argument(
                &call.name,
                format!("argument {} must be a string", index + 1),
            )
        })
}
