//! Pointwise combinators over aligned series

use async_trait::async_trait;
use common::model::{TimeSeries, check_alignment};

use super::{SeriesFunction, Signature, eval_series_args};
use crate::query::graphite::ast::{ArgKind, FunctionCall};
use crate::query::graphite::context::EvaluationContext;
use crate::query::graphite::error::{GraphiteError, GraphiteResult};
use crate::query::graphite::evaluator::Evaluator;

/// Combine aligned inputs slot by slot into one series named `name`.
///
/// Empty input is a valid "no data" outcome and yields no series.
fn combine<F>(
    function: &str,
    name: String,
    inputs: &[TimeSeries],
    reduce: F,
) -> GraphiteResult<Vec<TimeSeries>>
where
    F: Fn(&[Option<f64>]) -> Option<f64>,
{
    let Some(first) = inputs.first() else {
        return Ok(Vec::new());
    };
    if !check_alignment(inputs) {
        return Err(GraphiteError::not_aligned(function));
    }

    let mut column = Vec::with_capacity(inputs.len());
    let values = (0..first.len())
        .map(|i| {
            column.clear();
            column.extend(inputs.iter().map(|ts| ts.values[i]));
            reduce(&column)
        })
        .collect();

    let output = TimeSeries::new(name, first.from, first.to, first.step).with_values(values);
    Ok(vec![output])
}

/// `averageSeries(seriesList)`
///
/// Missing samples count as 0 in the sum and the divisor is always the number
/// of input series, so a gap pulls the average toward zero instead of being
/// left out. Callers relying on gap-excluding averages need a different
/// function.
pub struct AverageSeries;

fn average_missing_as_zero(column: &[Option<f64>]) -> Option<f64> {
    let sum: f64 = column.iter().map(|v| v.unwrap_or(0.0)).sum();
    Some(sum / column.len() as f64)
}

#[async_trait]
impl SeriesFunction for AverageSeries {
    fn signature(&self) -> Signature {
        Signature::exact(&[ArgKind::Series])
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let inputs = evaluator.eval(&call.args[0], context).await?;
        combine(&call.name, call.text(), &inputs, average_missing_as_zero)
    }
}

/// Variadic combinators: `sumSeries`, `maxSeries`, `minSeries`, `diffSeries`,
/// `rangeSeries`. Each takes one or more series lists and merges them all.
pub struct AggregateSeries {
    reduce: fn(&[Option<f64>]) -> Option<f64>,
}

impl AggregateSeries {
    /// Sum of present values, missing when none are present.
    pub fn sum() -> Self {
        Self {
            reduce: |column| present(column).reduce(|a, b| a + b),
        }
    }

    pub fn max() -> Self {
        Self {
            reduce: |column| present(column).reduce(f64::max),
        }
    }

    pub fn min() -> Self {
        Self {
            reduce: |column| present(column).reduce(f64::min),
        }
    }

    /// First series minus all the others; gaps count as 0.
    pub fn diff() -> Self {
        Self {
            reduce: |column| {
                if column.iter().all(Option::is_none) {
                    return None;
                }
                let first = column[0].unwrap_or(0.0);
                let rest: f64 = column[1..].iter().map(|v| v.unwrap_or(0.0)).sum();
                Some(first - rest)
            },
        }
    }

    pub fn range() -> Self {
        Self {
            reduce: |column| {
                let max = present(column).reduce(f64::max)?;
                let min = present(column).reduce(f64::min)?;
                Some(max - min)
            },
        }
    }
}

fn present(column: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    column.iter().filter_map(|v| *v)
}

#[async_trait]
impl SeriesFunction for AggregateSeries {
    fn signature(&self) -> Signature {
        Signature::variadic(&[ArgKind::Series], ArgKind::Series)
    }

    async fn evaluate(
        &self,
        call: &FunctionCall,
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> GraphiteResult<Vec<TimeSeries>> {
        let inputs = eval_series_args(call, evaluator, context).await?;
        combine(&call.name, call.text(), &inputs, self.reduce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::graphite::testing::{StaticStore, evaluate, series};

    fn ab_store() -> StaticStore {
        StaticStore::new().with(
            "m.*",
            vec![
                series("m.a", &[Some(1.0), Some(2.0), None]),
                series("m.b", &[Some(3.0), Some(4.0), Some(5.0)]),
            ],
        )
    }

    #[tokio::test]
    async fn test_average_counts_missing_as_zero() {
        let result = evaluate("averageSeries(m.*)", &ab_store()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "averageSeries(m.*)");
        assert_eq!((result[0].from, result[0].to, result[0].step), (0, 3, 1));
        assert_eq!(result[0].values, vec![Some(2.0), Some(3.0), Some(2.5)]);
    }

    #[tokio::test]
    async fn test_average_is_mean_without_gaps() {
        let store = StaticStore::new().with(
            "m.*",
            vec![
                series("m.a", &[Some(1.0), Some(10.0)]),
                series("m.b", &[Some(2.0), Some(20.0)]),
                series("m.c", &[Some(6.0), Some(-3.0)]),
            ],
        );
        let result = evaluate("averageSeries(m.*)", &store).await.unwrap();
        assert_eq!(result[0].values, vec![Some(3.0), Some(9.0)]);
    }

    #[tokio::test]
    async fn test_average_of_nothing_is_empty() {
        let result = evaluate("averageSeries(missing.*)", &StaticStore::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_average_rejects_unaligned() {
        let store = StaticStore::new().with(
            "m.*",
            vec![
                series("m.a", &[Some(1.0), Some(2.0)]),
                TimeSeries::new("m.b", 0, 4, 2).with_values(vec![Some(1.0), Some(2.0)]),
            ],
        );
        let err = evaluate("averageSeries(m.*)", &store).await.unwrap_err();
        assert!(matches!(err, GraphiteError::NotAligned { ref function } if function == "averageSeries"));
    }

    #[tokio::test]
    async fn test_average_argument_contract() {
        let store = ab_store();
        for target in ["averageSeries()", "averageSeries(m.*, m.*)", "averageSeries('m.*')", "averageSeries(3)"] {
            let err = evaluate(target, &store).await.unwrap_err();
            assert!(
                matches!(err, GraphiteError::InvalidArgument { ref function, .. } if function == "averageSeries"),
                "{target}: {err}"
            );
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_avg_alias_names_by_call() {
        let result = evaluate("avg(m.*)", &ab_store()).await.unwrap();
        assert_eq!(result[0].name, "avg(m.*)");
    }

    #[tokio::test]
    async fn test_sum_skips_missing() {
        let store = StaticStore::new().with(
            "m.*",
            vec![
                series("m.a", &[Some(1.0), None, None]),
                series("m.b", &[Some(3.0), Some(4.0), None]),
            ],
        );
        let result = evaluate("sumSeries(m.*)", &store).await.unwrap();
        assert_eq!(result[0].values, vec![Some(4.0), Some(4.0), None]);
    }

    #[tokio::test]
    async fn test_sum_merges_all_arguments() {
        let store = ab_store().with("n.c", vec![series("n.c", &[Some(10.0), Some(10.0), Some(10.0)])]);
        let result = evaluate("sum(m.*, n.c)", &store).await.unwrap();
        assert_eq!(result[0].name, "sum(m.*,n.c)");
        assert_eq!(result[0].values, vec![Some(14.0), Some(16.0), Some(15.0)]);
    }

    #[tokio::test]
    async fn test_max_min_range() {
        let store = ab_store();
        let max = evaluate("maxSeries(m.*)", &store).await.unwrap();
        assert_eq!(max[0].values, vec![Some(3.0), Some(4.0), Some(5.0)]);
        let min = evaluate("minSeries(m.*)", &store).await.unwrap();
        assert_eq!(min[0].values, vec![Some(1.0), Some(2.0), Some(5.0)]);
        let range = evaluate("rangeSeries(m.*)", &store).await.unwrap();
        assert_eq!(range[0].values, vec![Some(2.0), Some(2.0), Some(0.0)]);
    }

    #[tokio::test]
    async fn test_diff() {
        let store = StaticStore::new().with(
            "m.*",
            vec![
                series("m.a", &[Some(10.0), None, None]),
                series("m.b", &[Some(3.0), Some(4.0), None]),
                series("m.c", &[Some(1.0), Some(1.0), None]),
            ],
        );
        let result = evaluate("diffSeries(m.*)", &store).await.unwrap();
        assert_eq!(result[0].values, vec![Some(6.0), Some(-5.0), None]);
    }

    #[tokio::test]
    async fn test_sum_rejects_unaligned_across_arguments() {
        let store = StaticStore::new()
            .with("a", vec![series("a", &[Some(1.0), Some(2.0)])])
            .with("b", vec![series("b", &[Some(1.0), Some(2.0), Some(3.0)])]);
        assert!(matches!(
            evaluate("sumSeries(a, b)", &store).await,
            Err(GraphiteError::NotAligned { .. })
        ));
    }
}
