//! Per-series transforms. Each input series produces exactly one output
//! series on the same time grid; alignment across inputs is not required.

use async_trait::async_trait;
use common::model::TimeSeries;

use super::{SeriesFunction, Signature, number_arg};
use crate::query::graphite::ast::{ArgKind, FunctionCall};
use crate::query::graphite::context::EvaluationContext;
use crate::query::graphite::error::GraphiteResult;
use crate::query::graphite::evaluator::Evaluator;

/// `fn(<series name>,<literal args>)`
pub(crate) fn derived_name(call: &FunctionCall, series_name: &str) -> String {
    let mut name = format!("{}({series_name}", call.name);
    for arg in call.args.iter().filter(|a| a.kind() != ArgKind::Series) {
        name.push(',');
        name.push_str(&arg.to_string());
    }
    name.push(')');
    name
}

async fn map_each<F>(
    call: &FunctionCall,
    evaluator: &Evaluator,
    context: &EvaluationContext,
    transform: F,
) -> GraphiteResult<Vec<TimeSeries>>
where
    F: Fn(&[Option<f64>]) -> Vec<Option<f64>> + Send,
{
    let inputs = evaluator.eval(&call.args[0], context).await?;
    Ok(inputs
        .into_iter()
        .map(|ts| {
            let values = transform(&ts.values);
            ts.rename(derived_name(call, &ts.name)).with_values(values)
        })
        .collect())
}

/// `scale(seriesList, factor)`
pub struct Scale;

#[async_trait]
impl SeriesFunction for Scale {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::Number])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let factor = number_arg(call, 1)?;
        map_each(call, evaluator, context, |values| {
            values.iter().map(|v| v.map(|v| v * factor)).collect()
        })
        .await
    }
}

/// `offset(seriesList, amount)`
pub struct Offset;

#[async_trait]
impl SeriesFunction for Offset {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::Number])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let amount = number_arg(call, 1)?;
        map_each(call, evaluator, context, |values| {
            values.iter().map(|v| v.map(|v| v + amount)).collect()
        })
        .await
    }
}

pub struct Absolute;

#[async_trait]
impl SeriesFunction for Absolute {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        map_each(call, evaluator, context, |values| {
            values.iter().map(|v| v.map(f64::abs)).collect()
        })
        .await
    }
}

/// Delta from the previous present sample. Gaps stay missing and do not
/// reset the previous value; `on_negative` decides what a drop becomes.
fn deltas<F>(values: &[Option<f64>], on_negative: F) -> Vec<Option<f64>>
where
    F: Fn(f64, f64) -> Option<f64>,
{
    let mut previous: Option<f64> = None;
    values
        .iter()
        .map(|current| {
            let current = (*current)?;
            let delta = previous.and_then(|prev| {
                let delta = current - prev;
                if delta < 0.0 {
                    on_negative(prev, current)
                } else {
                    Some(delta)
                }
            });
            previous = Some(current);
            delta
        })
        .collect()
}

pub struct Derivative;

#[async_trait]
impl SeriesFunction for Derivative {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        map_each(call, evaluator, context, |values| {
            deltas(values, |prev, current| Some(current - prev))
        })
        .await
    }
}

/// `nonNegativeDerivative(seriesList[, maxValue])`
///
/// Without `maxValue` a drop becomes a gap. With it, the counter is assumed
/// to have wrapped at `maxValue`.
pub struct NonNegativeDerivative;

#[async_trait]
impl SeriesFunction for NonNegativeDerivative {
    fn signature(&self) -> Signature {
        Signature::with_optional(&[ArgKind::Series], &[ArgKind::Number])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let max_value = if call.args.len() > 1 {
            Some(number_arg(call, 1)?)
        } else {
            None
        };
        map_each(call, evaluator, context, |values| {
            deltas(values, |prev, current| {
                max_value
                    .map(|max| max - prev + current + 1.0)
                    .filter(|wrapped| *wrapped >= 0.0)
            })
        })
        .await
    }
}

/// `transformNull(seriesList[, default])`
pub struct TransformNull;

#[async_trait]
impl SeriesFunction for TransformNull {
    fn signature(&self) -> Signature {
        Signature::with_optional(&[ArgKind::Series], &[ArgKind::Number])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let default = if call.args.len() > 1 {
            number_arg(call, 1)?
        } else {
            0.0
        };
        map_each(call, evaluator, context, |values| {
            values.iter().map(|v| Some(v.unwrap_or(default))).collect()
        })
        .await
    }
}
