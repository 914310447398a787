//! Render request envelope
//!
//! A request moves through `Received → Parsed → Evaluating` and ends in one
//! of [`RenderOutcome`]'s variants. This module is the only place where
//! engine errors are classified into response shapes.
//!
//! Evaluation runs as a spawned task behind a semaphore and is awaited with
//! the configured deadline. On timeout the request's cancellation token is
//! cancelled and the task aborted, so abandoned work stops at its next
//! await point instead of running to completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::QuerierConfig;
use common::model::TimeSeries;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::query::graphite::{
    EvaluationContext, Evaluator, Expr, ValueFormatter, parse_with_max_depth,
};
use crate::services::{StatsService, ThrottlingService};

pub mod error;
pub mod format;
pub mod params;

pub use error::{ApiError, RenderError};
pub use format::{FormattedResponse, OutputFormat, format_series};
pub use params::RenderParameters;

/// Terminal state of one render request
#[derive(Debug)]
pub enum RenderOutcome {
    Completed(FormattedResponse),
    /// The deadline elapsed; the evaluation was cancelled
    TimedOut,
    /// Throttling is enforced and the tenant is over budget
    Throttled { retry_after: Duration },
    Failed(RenderError),
}

pub struct RenderHandler {
    evaluator: Evaluator,
    throttler: Arc<dyn ThrottlingService>,
    stats: Arc<dyn StatsService>,
    permits: Arc<Semaphore>,
    request_timeout: Duration,
    max_expression_depth: usize,
    max_range: Duration,
    human_readable_numbers: bool,
    enforce_throttling: bool,
}

impl std::fmt::Debug for RenderHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHandler")
            .field("evaluator", &self.evaluator)
            .field("request_timeout", &self.request_timeout)
            .field("max_expression_depth", &self.max_expression_depth)
            .field("max_range", &self.max_range)
            .field("human_readable_numbers", &self.human_readable_numbers)
            .field("enforce_throttling", &self.enforce_throttling)
            .finish()
    }
}

impl RenderHandler {
    pub fn new(
        config: &QuerierConfig,
        evaluator: Evaluator,
        throttler: Arc<dyn ThrottlingService>,
        stats: Arc<dyn StatsService>,
    ) -> Self {
        Self {
            evaluator,
            throttler,
            stats,
            permits: Arc::new(Semaphore::new(config.max_concurrent_evaluations.max(1))),
            request_timeout: config.request_timeout,
            max_expression_depth: config.max_expression_depth,
            max_range: config.max_range,
            human_readable_numbers: config.human_readable_numbers,
            enforce_throttling: false,
        }
    }

    /// Turn a non-zero throttle delay into a `Throttled` outcome.
    pub fn with_enforced_throttling(mut self, enforce: bool) -> Self {
        self.enforce_throttling = enforce;
        self
    }

    fn formatter_for(&self, format: OutputFormat) -> ValueFormatter {
        if self.human_readable_numbers {
            ValueFormatter::for_format(format)
        } else {
            ValueFormatter::Machine
        }
    }

    #[tracing::instrument(skip_all, fields(tenant = %params.tenant, targets = params.targets.len()))]
    pub async fn handle(&self, params: RenderParameters) -> RenderOutcome {
        let started = Instant::now();
        let outcome = self.run(params).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            RenderOutcome::Completed(_) => tracing::debug!(elapsed_ms, "Render completed"),
            RenderOutcome::TimedOut => tracing::warn!(elapsed_ms, "Render timed out"),
            RenderOutcome::Throttled { retry_after } => tracing::info!(
                elapsed_ms,
                retry_after_ms = retry_after.as_millis() as u64,
                "Render throttled"
            ),
            RenderOutcome::Failed(RenderError::Internal(detail)) => {
                tracing::error!(elapsed_ms, error = %detail, "Render failed")
            }
            RenderOutcome::Failed(err) => tracing::debug!(elapsed_ms, error = %err, "Render rejected"),
        }
        outcome
    }

    async fn run(&self, params: RenderParameters) -> RenderOutcome {
        if let Err(err) = params.check_range(self.max_range) {
            return RenderOutcome::Failed(err);
        }

        // Received → Parsed
        let mut exprs = Vec::with_capacity(params.targets.len());
        for target in &params.targets {
            match parse_with_max_depth(target, self.max_expression_depth) {
                Ok(expr) => exprs.push(expr),
                Err(err) => {
                    tracing::debug!(expression = %target, error = %err, "Rejecting target");
                    return RenderOutcome::Failed(RenderError::InvalidParameter(err.to_string()));
                }
            }
        }
        if let Err(err) = exprs.iter().try_for_each(|expr| self.evaluator.validate(expr)) {
            return RenderOutcome::Failed(err.into());
        }

        let tenant = params.tenant.as_str();
        let delay = self.throttler.throttle(tenant);
        self.stats.inc_render_requests(tenant);
        if delay > 0.0 {
            self.stats.inc_throttle_time(tenant, delay);
            if self.enforce_throttling {
                return RenderOutcome::Throttled {
                    retry_after: Duration::from_secs_f64(delay),
                };
            }
            tracing::debug!(delay, "Tenant over throttling budget");
        }

        // Parsed → Evaluating
        let formatter = self.formatter_for(params.format);
        let cancellation = CancellationToken::new();
        let context = EvaluationContext::new(tenant, params.from, params.until, formatter)
            .with_cancellation(cancellation.clone());

        let permits = self.permits.clone();
        let evaluator = self.evaluator.clone();
        let format = params.format;
        let mut task = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| RenderError::Internal(format!("worker pool closed: {e}")))?;
            let series = evaluate_all(&evaluator, &exprs, &context).await?;
            format_series(&series, format, context.formatter())
        });

        match tokio::time::timeout(self.request_timeout, &mut task).await {
            Ok(Ok(Ok(response))) => RenderOutcome::Completed(response),
            Ok(Ok(Err(err))) => RenderOutcome::Failed(err),
            Ok(Err(join_err)) => RenderOutcome::Failed(RenderError::Internal(format!(
                "evaluation task failed: {join_err}"
            ))),
            Err(_) => {
                cancellation.cancel();
                task.abort();
                self.stats.inc_timed_out_requests(tenant);
                RenderOutcome::TimedOut
            }
        }
    }
}

/// Evaluate targets in order and concatenate their series.
async fn evaluate_all(
    evaluator: &Evaluator,
    exprs: &[Expr],
    context: &EvaluationContext,
) -> Result<Vec<TimeSeries>, RenderError> {
    let mut results = Vec::new();
    for expr in exprs {
        results.extend(evaluator.eval(expr, context).await?);
    }
    Ok(results)
}
