//! Response payload formatting

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::DateTime;
use common::model::TimeSeries;
use serde::Serialize;

use super::error::RenderError;
use crate::query::graphite::ValueFormatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Raw,
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "raw" => Ok(Self::Raw),
            other => Err(RenderError::InvalidParameter(format!(
                "unsupported format: {other}"
            ))),
        }
    }
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Raw => "text/plain",
        }
    }
}

/// Body and content type of a completed render.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResponse {
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Serialize)]
struct JsonSeries<'a> {
    target: &'a str,
    datapoints: Vec<(Option<f64>, i64)>,
}

/// Render series in the requested format.
///
/// JSON values are always machine precise; CSV and raw go through `formatter`.
pub fn format_series(
    series: &[TimeSeries],
    format: OutputFormat,
    formatter: ValueFormatter,
) -> Result<FormattedResponse, RenderError> {
    let body = match format {
        OutputFormat::Json => {
            let payload: Vec<JsonSeries<'_>> = series
                .iter()
                .map(|ts| JsonSeries {
                    target: &ts.name,
                    datapoints: ts.values.iter().copied().zip(ts.timestamps()).collect(),
                })
                .collect();
            serde_json::to_string(&payload)
                .map_err(|e| RenderError::Internal(format!("failed to serialize series: {e}")))?
        }
        OutputFormat::Csv => {
            let mut out = String::new();
            for ts in series {
                for (value, timestamp) in ts.values.iter().zip(ts.timestamps()) {
                    let when = DateTime::from_timestamp(timestamp, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| timestamp.to_string());
                    let value = value.map(|v| formatter.format(v)).unwrap_or_default();
                    let _ = writeln!(out, "{},{when},{value}", ts.name);
                }
            }
            out
        }
        OutputFormat::Raw => {
            let mut out = String::new();
            for ts in series {
                let values: Vec<String> = ts
                    .values
                    .iter()
                    .map(|v| v.map(|v| formatter.format(v)).unwrap_or_else(|| "None".to_string()))
                    .collect();
                let _ = writeln!(
                    out,
                    "{},{},{},{}|{}",
                    ts.name,
                    ts.from,
                    ts.to,
                    ts.step,
                    values.join(",")
                );
            }
            out
        }
    };

    Ok(FormattedResponse {
        content_type: format.content_type(),
        body,
    })
}
