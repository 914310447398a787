//! Fixtures shared by the graphite unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::model::TimeSeries;

use super::context::{EvaluationContext, ValueFormatter};
use super::error::GraphiteResult;
use super::evaluator::Evaluator;
use super::functions::FunctionRegistry;
use super::parser::parse;
use crate::services::storage::{MetricStore, StorageError};

/// Store answering exact patterns with canned series and counting fetches.
#[derive(Clone, Default)]
pub struct StaticStore {
    series: HashMap<String, Vec<TimeSeries>>,
    calls: Arc<AtomicUsize>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pattern: &str, series: Vec<TimeSeries>) -> Self {
        self.series.insert(pattern.to_string(), series);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricStore for StaticStore {
    async fn fetch(
        &self,
        _tenant: &str,
        pattern: &str,
        _from: i64,
        _until: i64,
    ) -> Result<Vec<TimeSeries>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.series.get(pattern).cloned().unwrap_or_default())
    }
}

/// Series starting at 0 with a one second step.
pub fn series(name: &str, values: &[Option<f64>]) -> TimeSeries {
    TimeSeries::new(name, 0, values.len() as i64, 1).with_values(values.to_vec())
}

pub fn context() -> EvaluationContext {
    EvaluationContext::new("tenant", 0, 3, ValueFormatter::Machine)
}

pub async fn evaluate(target: &str, store: &StaticStore) -> GraphiteResult<Vec<TimeSeries>> {
    evaluate_with(target, store, &context()).await
}

pub async fn evaluate_with(
    target: &str,
    store: &StaticStore,
    context: &EvaluationContext,
) -> GraphiteResult<Vec<TimeSeries>> {
    let expr = parse(target)?;
    let evaluator = Evaluator::new(
        Arc::new(store.clone()),
        Arc::new(FunctionRegistry::standard()),
    );
    evaluator.eval(&expr, context).await
}

/// Static checks only; never touches a store.
pub fn validate(target: &str) -> GraphiteResult<()> {
    let expr = parse(target)?;
    Evaluator::new(
        Arc::new(StaticStore::new()),
        Arc::new(FunctionRegistry::standard()),
    )
    .validate(&expr)
}
