//! The value-level series model shared by the storage layer and the evaluator.

use serde::{Deserialize, Serialize};

/// A named run of samples over `[from, to)` at a fixed step.
///
/// Timestamps are epoch seconds. A missing sample is `None`, which is not the
/// same thing as `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Display label, usually the rendering of the expression that produced it
    pub name: String,
    /// Inclusive start timestamp
    pub from: i64,
    /// Exclusive end timestamp
    pub to: i64,
    /// Seconds per sample
    pub step: i64,
    /// One slot per step, `ceil((to - from) / step)` of them
    pub values: Vec<Option<f64>>,
}

impl TimeSeries {
    /// Create a series covering `[from, to)` with every sample missing.
    pub fn new(name: impl Into<String>, from: i64, to: i64, step: i64) -> Self {
        let length = expected_len(from, to, step);
        Self {
            name: name.into(),
            from,
            to,
            step,
            values: vec![None; length],
        }
    }

    /// Replace the samples.
    pub fn with_values(mut self, values: Vec<Option<f64>>) -> Self {
        self.values = values;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Timestamp of every slot, in order.
    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.values.len()).map(move |i| self.from + i as i64 * self.step)
    }

    /// A copy of this series carrying a different name.
    pub fn rename(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Present samples only, in order.
    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(|v| *v)
    }

    /// Last present sample.
    pub fn last_present(&self) -> Option<f64> {
        self.values.iter().rev().find_map(|v| *v)
    }
}

fn expected_len(from: i64, to: i64, step: i64) -> usize {
    if step <= 0 || to <= from {
        return 0;
    }
    let span = i128::from(to) - i128::from(from);
    let step = i128::from(step);
    usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX)
}

/// Whether the series can be combined pointwise.
///
/// Empty and single-element inputs are trivially aligned; otherwise every
/// series must share `from`, `to`, `step` and sample count with the first.
pub fn check_alignment(series: &[TimeSeries]) -> bool {
    let Some(first) = series.first() else {
        return true;
    };

    series.iter().skip(1).all(|ts| {
        ts.from == first.from
            && ts.to == first.to
            && ts.step == first.step
            && ts.values.len() == first.values.len()
    })
}
