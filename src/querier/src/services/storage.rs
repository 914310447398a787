//! Raw series retrieval
//!
//! The evaluator only sees the [`MetricStore`] trait. The in-memory store is
//! what the standalone server and the tests run against.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use common::model::TimeSeries;
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid series pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("time range {from}..{until} is out of bounds")]
    InvalidRange { from: i64, until: i64 },
}

/// Resolves a glob pattern to concrete series for one tenant.
///
/// A pattern that matches nothing yields an empty vector, not an error.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn fetch(
        &self,
        tenant: &str,
        pattern: &str,
        from: i64,
        until: i64,
    ) -> Result<Vec<TimeSeries>, StorageError>;
}

/// Translate a Graphite glob into an anchored regex.
///
/// `*` and `?` never cross a `.` boundary, `[...]` is a character class
/// (`[!...]` negated) and `{a,b}` is alternation.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, StorageError> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let mut chars = pattern.chars().peekable();
    let mut brace_depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str("[^.]*"),
            '?' => re.push_str("[^.]"),
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    re.push('^');
                }
                let mut closed = false;
                for class_char in chars.by_ref() {
                    if class_char == ']' {
                        closed = true;
                        break;
                    }
                    if class_char == '\\' || class_char == '[' {
                        re.push('\\');
                    }
                    re.push(class_char);
                }
                if !closed {
                    return Err(StorageError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "unterminated character class".to_string(),
                    });
                }
                re.push(']');
            }
            '{' => {
                brace_depth += 1;
                re.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                re.push(')');
            }
            ',' if brace_depth > 0 => re.push('|'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }

    if brace_depth > 0 {
        return Err(StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "unterminated alternation".to_string(),
        });
    }

    re.push('$');
    Regex::new(&re).map_err(|e| StorageError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

type TenantSeries = BTreeMap<String, BTreeMap<i64, f64>>;

/// Series kept in memory at a single resolution.
#[derive(Debug)]
pub struct InMemoryMetricStore {
    step: i64,
    tenants: RwLock<HashMap<String, TenantSeries>>,
}

impl InMemoryMetricStore {
    pub fn new(step: i64) -> Self {
        Self {
            step: step.max(1),
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Store a point; the timestamp is truncated to the store resolution and
    /// the last write for a slot wins.
    pub fn insert(
        &self,
        tenant: &str,
        path: &str,
        timestamp: i64,
        value: f64,
    ) -> Result<(), StorageError> {
        let slot = timestamp
            .checked_sub(timestamp.rem_euclid(self.step))
            .ok_or(StorageError::InvalidRange {
                from: timestamp,
                until: timestamp,
            })?;
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| StorageError::Unavailable("series lock poisoned".to_string()))?;
        tenants
            .entry(tenant.to_string())
            .or_default()
            .entry(path.to_string())
            .or_default()
            .insert(slot, value);
        Ok(())
    }

    /// Aligned bounds covering `[from, until)`.
    fn bounds(&self, from: i64, until: i64) -> Result<(i64, i64), StorageError> {
        let out_of_range = || StorageError::InvalidRange { from, until };
        let step = self.step;
        let start = from
            .checked_sub(from.rem_euclid(step))
            .ok_or_else(out_of_range)?;
        let mut end = until
            .checked_add((step - until.rem_euclid(step)) % step)
            .ok_or_else(out_of_range)?;
        if end <= start {
            end = start.checked_add(step).ok_or_else(out_of_range)?;
        }
        Ok((start, end))
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn fetch(
        &self,
        tenant: &str,
        pattern: &str,
        from: i64,
        until: i64,
    ) -> Result<Vec<TimeSeries>, StorageError> {
        let matcher = glob_to_regex(pattern)?;
        let (start, end) = self.bounds(from, until)?;

        let tenants = self
            .tenants
            .read()
            .map_err(|_| StorageError::Unavailable("series lock poisoned".to_string()))?;
        let Some(paths) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };

        let series = paths
            .iter()
            .filter(|(path, _)| matcher.is_match(path))
            .map(|(path, points)| {
                let mut ts = TimeSeries::new(path.clone(), start, end, self.step);
                let step = self.step;
                for (i, slot) in ts.values.iter_mut().enumerate() {
                    *slot = points.get(&(start + i as i64 * step)).copied();
                }
                ts
            })
            .collect();

        Ok(series)
    }
}
