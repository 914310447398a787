//! Renaming functions. Values are never touched.

use async_trait::async_trait;
use common::model::TimeSeries;

use super::filter::compile_regex;
use super::{SeriesFunction, Signature, string_arg};
use crate::query::graphite::ast::{ArgKind, Expr, FunctionCall};
use crate::query::graphite::context::EvaluationContext;
use crate::query::graphite::error::{GraphiteError, GraphiteResult};
use crate::query::graphite::evaluator::Evaluator;

/// `alias(seriesList, newName)`
pub struct Alias;

#[async_trait]
impl SeriesFunction for Alias {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::String])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let name = string_arg(call, 1)?;
        let inputs = evaluator.eval(&call.args[0], context).await?;
        Ok(inputs.iter().map(|ts| ts.rename(name)).collect())
    }
}

/// Innermost metric path of a possibly decorated name, so
/// `scale(a.b.c,2)` yields `a.b.c`.
fn base_path(name: &str) -> &str {
    let inner = name.rsplit('(').next().unwrap_or(name);
    inner.split([',', ')']).next().unwrap_or(inner)
}

/// `aliasByNode(seriesList, *nodes)`
pub struct AliasByNode;

impl AliasByNode {
    fn indices(call: &FunctionCall) -> GraphiteResult<Vec<i64>> {
        call.args[1..]
            .iter()
            .map(|arg| match arg.as_number() {
                Some(n) if n.fract() == 0.0 => Ok(n as i64),
                _ => Err(GraphiteError::invalid_argument(
                    &call.name,
                    format!("node index {arg} must be an integer"),
                )),
            })
            .collect()
    }
}

#[async_trait]
impl SeriesFunction for AliasByNode {
    fn signature(&self) -> Signature {
        Signature::variadic(&[ArgKind::Series, ArgKind::Number], ArgKind::Number)
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let indices = Self::indices(call)?;
        let inputs = evaluator.eval(&call.args[0], context).await?;

        inputs
            .iter()
            .map(|ts| {
                let nodes: Vec<&str> = base_path(&ts.name).split('.').collect();
                let picked = indices
                    .iter()
                    .map(|&index| {
                        let resolved = if index < 0 {
                            nodes.len() as i64 + index
                        } else {
                            index
                        };
                        usize::try_from(resolved)
                            .ok()
                            .and_then(|i| nodes.get(i).copied())
                            .ok_or_else(|| {
                                GraphiteError::invalid_argument(
                                    &call.name,
                                    format!("node {index} is out of range for '{}'", ts.name),
                                )
                            })
                    })
                    .collect::<GraphiteResult<Vec<_>>>()?;
                Ok(ts.rename(picked.join(".")))
            })
            .collect()
    }
}

/// Rewrite `\1` style backreferences to the `${1}` form the regex crate expects.
fn replacement_template(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len());
    let mut chars = replace.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(char::is_ascii_digit) => {
                out.push_str("${");
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    out.push(d);
                }
                out.push('}');
            }
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}

/// `aliasSub(seriesList, search, replace)`
pub struct AliasSub;

#[async_trait]
impl SeriesFunction for AliasSub {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series, ArgKind::String, ArgKind::String])
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
        let search = compile_regex(call, string_arg(call, 1)?)?;
        let replace = replacement_template(string_arg(call, 2)?);
        let inputs = evaluator.eval(&call.args[0], context).await?;
        Ok(inputs
            .iter()
            .map(|ts| ts.rename(search.replace_all(&ts.name, replace.as_str())))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Statistic {
    Avg,
    Total,
    Min,
    Max,
    Last,
}

impl Statistic {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Self::Avg),
            "total" | "sum" => Some(Self::Total),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    fn compute(self, ts: &TimeSeries) -> Option<f64> {
        match self {
            Self::Avg => {
                let (sum, count) = ts.present().fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                (count > 0).then(|| sum / count as f64)
            }
            Self::Total => ts.present().reduce(|a, b| a + b),
            Self::Min => ts.present().reduce(f64::min),
            Self::Max => ts.present().reduce(f64::max),
            Self::Last => ts.last_present(),
        }
    }
}

/// `legendValue(seriesList, *statistics)`
///
/// Appends ` (<stat>: <value>)` per requested statistic, formatted with the
/// request's [`ValueFormatter`](crate::query::graphite::context::ValueFormatter).
pub struct LegendValue;

#[async_trait]
impl SeriesFunction for LegendValue {
    fn signature(&self) -> Signature {
        Signature::variadic(&[ArgKind::Series, ArgKind::String], ArgKind::String)
    }

    fn validate(&self, call: &FunctionCall) -> GraphiteResult<()> {
        self.signature().check(&call.name, &call.args)?;
        for arg in &call.args[1..] {
            let name = arg.as_str().unwrap_or_default();
            if Statistic::parse(name).is_none() {
                return Err(GraphiteError::invalid_argument(
                    &call.name,
                    format!("unknown statistic '{name}'"),
                ));
            }
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let statistics: Vec<(&str, Statistic)> = call.args[1..]
            .iter()
            .filter_map(Expr::as_str)
            .filter_map(|name| Statistic::parse(name).map(|s| (name, s)))
            .collect();
        let formatter = context.formatter();
        let inputs = evaluator.eval(&call.args[0], context).await?;

        Ok(inputs
            .iter()
            .map(|ts| {
                let mut name = ts.name.clone();
                for (label, statistic) in &statistics {
                    let value = statistic
                        .compute(ts)
                        .map(|v| formatter.format(v))
                        .unwrap_or_else(|| "None".to_string());
                    name.push_str(&format!(" ({label}: {value})"));
                }
                ts.rename(name)
            })
            .collect())
    }
}
