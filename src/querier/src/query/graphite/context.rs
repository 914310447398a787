//! Request-scoped evaluation context

use tokio_util::sync::CancellationToken;

use super::error::GraphiteError;
use crate::render::format::OutputFormat;

/// How numbers are rendered into series names and text payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormatter {
    /// Shortest decimal that round-trips
    Machine,
    /// Two decimals with an SI suffix (`K`, `M`, `G`, `T`, `P`)
    Human,
}

const SUFFIXES: [(f64, &str); 5] = [
    (1e15, "P"),
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "M"),
    (1e3, "K"),
];

impl ValueFormatter {
    /// Formatter appropriate for a response format when human-readable numbers are enabled.
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Machine,
            OutputFormat::Csv | OutputFormat::Raw => Self::Human,
        }
    }

    pub fn format(&self, value: f64) -> String {
        match self {
            Self::Machine => value.to_string(),
            Self::Human => {
                let (scaled, suffix) = SUFFIXES
                    .iter()
                    .find(|(limit, _)| value.abs() >= *limit)
                    .map(|(limit, suffix)| (value / limit, *suffix))
                    .unwrap_or((value, ""));
                let mut text = format!("{scaled:.2}");
                if text.contains('.') {
                    text = text.trim_end_matches('0').trim_end_matches('.').to_string();
                }
                if text == "-0" {
                    text = "0".to_string();
                }
                format!("{text}{suffix}")
            }
        }
    }
}

/// Read-only configuration shared by every function in every target of one request.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    tenant: String,
    from: i64,
    until: i64,
    formatter: ValueFormatter,
    cancellation: CancellationToken,
}

impl EvaluationContext {
    pub fn new(tenant: impl Into<String>, from: i64, until: i64, formatter: ValueFormatter) -> Self {
        Self {
            tenant: tenant.into(),
            from,
            until,
            formatter,
            cancellation: CancellationToken::new(),
        }
    }

    /// Tie evaluation to an externally owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn until(&self) -> i64 {
        self.until
    }

    pub fn formatter(&self) -> ValueFormatter {
        self.formatter
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fails with `Cancelled` once the request has been abandoned.
    pub fn check_cancelled(&self) -> Result<(), GraphiteError> {
        if self.cancellation.is_cancelled() {
            Err(GraphiteError::Cancelled)
        } else {
            Ok(())
        }
    }
}
