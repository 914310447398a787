//! Filters pass a subset of their input through untouched.

use async_trait::async_trait;
use common::model::TimeSeries;
use regex::Regex;

use super::{SeriesFunction, Signature, number_arg, string_arg};
use crate::query::graphite::ast::{ArgKind, FunctionCall};
use crate::query::graphite::context::EvaluationContext;
use crate::query::graphite::error::{GraphiteError, GraphiteResult};
use crate::query::graphite::evaluator::Evaluator;

fn average(ts: &TimeSeries) -> Option<f64> {
    let (sum, count) = ts.present().fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Threshold filters: `currentAbove`, `currentBelow`, `averageAbove`,
/// `averageBelow`. A series with no present values never passes.
pub struct ValueFilter {
    statistic: fn(&TimeSeries) -> Option<f64>,
    above: bool,
}

impl ValueFilter {
    pub fn current_above() -> Self {
        Self {
            statistic: TimeSeries::last_present,
            above: true,
        }
    }

    pub fn current_below() -> Self {
        Self {
            statistic: TimeSeries::last_present,
            above: false,
        }
    }

    pub fn average_above() -> Self {
        Self {
            statistic: average,
            above: true,
        }
    }

    pub fn average_below() -> Self {
        Self {
            statistic: average,
            above: false,
        }
    }

    fn keeps(&self, ts: &TimeSeries, threshold: f64) -> bool {
        match (self.statistic)(ts) {
            Some(value) if self.above => value > threshold,
            Some(value) => value <= threshold,
            None => false,
        }
    }
}

#[async_trait]
impl SeriesFunction for ValueFilter {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::Number])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let threshold = number_arg(call, 1)?;
        let inputs = evaluator.eval(&call.args[0], context).await?;
        Ok(inputs
            .into_iter()
            .filter(|ts| self.keeps(ts, threshold))
            .collect())
    }
}

/// Compile a user supplied regex, reporting failures against the function.
pub(crate) fn compile_regex(call: &FunctionCall, pattern: &str) -> GraphiteResult<Regex> {
    Regex::new(pattern).map_err(|e| {
        GraphiteError::invalid_argument(&call.name, format!("invalid regex '{pattern}': {e}"))
    })
}

/// `grep` keeps matching names, `exclude` drops them.
pub struct NameFilter {
    keep_matches: bool,
}

impl NameFilter {
    pub fn grep() -> Self {
        Self { keep_matches: true }
    }

    pub fn exclude() -> Self {
        Self {
            keep_matches: false,
        }
    }
}

#[async_trait]
impl SeriesFunction for NameFilter {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::String])
    }

    fn validate(&self, call: &FunctionCall) -> GraphiteResult<()> {
        self.signature().check(&call.name, &call.args)?;
        compile_regex(call, string_arg(call, 1)?).map(drop)
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let pattern = compile_regex(call, string_arg(call, 1)?)?;
        let inputs = evaluator.eval(&call.args[0], context).await?;
        Ok(inputs
            .into_iter()
            .filter(|ts| pattern.is_match(&ts.name) == self.keep_matches)
            .collect())
    }
}

/// `limit(seriesList, n)`
pub struct Limit;

#[async_trait]
impl SeriesFunction for Limit {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::Number])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let n = number_arg(call, 1)?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(GraphiteError::invalid_argument(
                &call.name,
                format!("limit must be a non-negative integer, got {n}"),
            ));
        }
        let mut inputs = evaluator.eval(&call.args[0], context).await?;
        inputs.truncate(n as usize);
        Ok(inputs)
    }
}
