//! Render request parameters

use std::time::Duration;

use super::error::RenderError;
use super::format::OutputFormat;

/// Tenant used when the request names none
pub const DEFAULT_TENANT: &str = "NONE";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderParameters {
    pub tenant: String,
    /// Target strings in request order
    pub targets: Vec<String>,
    pub from: i64,
    pub until: i64,
    pub format: OutputFormat,
}

impl RenderParameters {
    /// Collect parameters from the query string and a form-encoded body.
    ///
    /// Keys present in both are concatenated in query-then-body order, which
    /// matters only for `target`. The `tenant` parameter wins over the
    /// `x-tenant-id` header.
    pub fn parse(
        query: &str,
        body: &str,
        tenant_header: Option<&str>,
        now: i64,
    ) -> Result<Self, RenderError> {
        let mut targets = Vec::new();
        let mut tenant = None;
        let mut from = None;
        let mut until = None;
        let mut format = None;

        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .chain(url::form_urlencoded::parse(body.as_bytes()));
        for (key, value) in pairs {
            match key.as_ref() {
                "target" => targets.push(value.into_owned()),
                "tenant" => tenant = Some(value.into_owned()),
                "from" => from = Some(value.into_owned()),
                "until" => until = Some(value.into_owned()),
                "format" => format = Some(value.into_owned()),
                _ => {}
            }
        }

        targets.retain(|t| !t.trim().is_empty());
        if targets.is_empty() {
            return Err(RenderError::InvalidParameter(
                "no target specified".to_string(),
            ));
        }

        let tenant = tenant
            .filter(|t| !t.is_empty())
            .or_else(|| tenant_header.filter(|t| !t.is_empty()).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_TENANT.to_string());

        let from = parse_time("from", from.as_deref().unwrap_or("-1d"), now)?;
        let until = parse_time("until", until.as_deref().unwrap_or("now"), now)?;
        if from >= until {
            return Err(RenderError::InvalidParameter(format!(
                "from ({from}) must be before until ({until})"
            )));
        }

        let format = match format.as_deref() {
            Some(f) => f.parse()?,
            None => OutputFormat::default(),
        };

        Ok(Self {
            tenant,
            targets,
            from,
            until,
            format,
        })
    }

    /// Reject spans wider than `max_range`.
    pub fn check_range(&self, max_range: Duration) -> Result<(), RenderError> {
        let span = i128::from(self.until) - i128::from(self.from);
        if span > i128::from(max_range.as_secs()) {
            return Err(RenderError::InvalidParameter(format!(
                "time range of {span}s exceeds the maximum of {}s",
                max_range.as_secs()
            )));
        }
        Ok(())
    }
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit {
        "s" => Some(1),
        "min" => Some(60),
        "h" => Some(3_600),
        "d" => Some(86_400),
        "w" => Some(7 * 86_400),
        "mon" => Some(30 * 86_400),
        "y" => Some(365 * 86_400),
        _ => None,
    }
}

/// Epoch seconds, `now`, or `-<n><unit>` relative to `now`.
pub fn parse_time(name: &str, value: &str, now: i64) -> Result<i64, RenderError> {
    let invalid = || RenderError::InvalidParameter(format!("invalid {name} value: {value}"));
    let value = value.trim();

    if value.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(relative) = value.strip_prefix('-') {
        let split = relative
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (amount, unit) = relative.split_at(split);
        let amount: i64 = amount.parse().map_err(|_| invalid())?;
        let seconds = unit_seconds(unit).ok_or_else(invalid)?;
        let offset = amount.checked_mul(seconds).ok_or_else(invalid)?;
        return now.checked_sub(offset).ok_or_else(invalid);
    }

    value.parse::<i64>().map_err(|_| invalid())
}
