use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::TENANT_HEADER;
use crate::QuerierState;
use crate::render::ApiError;
use crate::render::params::DEFAULT_TENANT;
use crate::services::StorageError;

#[derive(Debug, Deserialize)]
pub struct IngestParams {
    tenant: Option<String>,
}

/// One `path value timestamp` line of the carbon plaintext protocol.
fn parse_line(line: &str) -> Option<(&str, f64, i64)> {
    let mut fields = line.split_whitespace();
    let path = fields.next()?;
    let value = fields.next()?.parse().ok()?;
    let timestamp = fields.next()?.parse::<f64>().ok()?;
    if fields.next().is_some() || !timestamp.is_finite() {
        return None;
    }
    Some((path, value, timestamp as i64))
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new("invalid_metric", message)),
    )
        .into_response()
}

/// POST /metrics
///
/// Accepts carbon plaintext lines for the request's tenant. The whole body is
/// rejected if any line is malformed.
#[tracing::instrument(skip_all)]
pub async fn ingest<S: QuerierState>(
    State(state): State<S>,
    Query(params): Query<IngestParams>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(store) = state.metric_store() else {
        return (
            StatusCode::NOT_IMPLEMENTED,
            Json(ApiError::new(
                "not_supported",
                "The configured store does not accept writes",
            )),
        )
            .into_response();
    };

    let tenant = params
        .tenant
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(TENANT_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_TENANT.to_string());

    let mut points = Vec::new();
    for (number, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(point) => points.push(point),
            None => return bad_request(format!("malformed line {}: {line}", number + 1)),
        }
    }

    for (path, value, timestamp) in &points {
        if let Err(e) = store.insert(&tenant, path, *timestamp, *value) {
            if matches!(e, StorageError::InvalidRange { .. }) {
                return bad_request(format!("timestamp out of range: {timestamp}"));
            }
            tracing::error!(error = %e, "Failed to store metric");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("internal_error", "Internal server error")),
            )
                .into_response();
        }
    }

    tracing::debug!(tenant = %tenant, points = points.len(), "Ingested metrics");
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use common::testing::TestConfigBuilder;
    use tower::ServiceExt;

    use crate::{InMemoryQuerierState, query_router};

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("a.b 1.5 60"), Some(("a.b", 1.5, 60)));
        assert_eq!(parse_line("a.b 1.5 60.9"), Some(("a.b", 1.5, 60)));
        assert_eq!(parse_line("a.b 1.5"), None);
        assert_eq!(parse_line("a.b x 60"), None);
        assert_eq!(parse_line("a.b 1 60 extra"), None);
    }

    #[tokio::test]
    async fn test_ingest_then_render() {
        let config = TestConfigBuilder::new()
            .with_storage_resolution(std::time::Duration::from_secs(60))
            .build();
        let app = query_router(InMemoryQuerierState::new(&config));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/metrics?tenant=acme")
                    .body(Body::from("web.cpu 10 0\nweb.cpu 30 60\n\ndb.cpu 5 0\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 204);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/render?target=sumSeries(*.cpu)&from=0&until=120&format=raw&tenant=acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"sumSeries(*.cpu),0,120,60|15,30\n");
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let app = query_router(InMemoryQuerierState::new(&TestConfigBuilder::new().build()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/metrics")
                    .body(Body::from("good.line 1 0\nbad line\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_unrepresentable_timestamp_is_rejected() {
        let app = query_router(InMemoryQuerierState::new(&TestConfigBuilder::new().build()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/metrics")
                    .body(Body::from("a.b 1 -1e30\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }
}
