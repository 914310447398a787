use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::TENANT_HEADER;
use crate::QuerierState;
use crate::render::{RenderOutcome, RenderParameters};

/// GET|POST /render?target=<expr>&from=<time>&until=<time>&format=<json|csv|raw>
///
/// Targets may also arrive in a form-encoded body.
#[tracing::instrument(skip_all)]
pub async fn render<S: QuerierState>(
    State(state): State<S>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Response {
    let tenant_header = headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok());
    let now = chrono::Utc::now().timestamp();

    let params = match RenderParameters::parse(
        query.as_deref().unwrap_or_default(),
        &body,
        tenant_header,
        now,
    ) {
        Ok(params) => params,
        Err(err) => return err.into_response(),
    };

    match state.render_handler().handle(params).await {
        RenderOutcome::Completed(response) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, response.content_type)],
            response.body,
        )
            .into_response(),
        RenderOutcome::TimedOut => StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        RenderOutcome::Throttled { retry_after } => {
            let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            response
        }
        RenderOutcome::Failed(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use common::testing::TestConfigBuilder;
    use tower::ServiceExt;

    use crate::services::InMemoryMetricStore;
    use crate::{InMemoryQuerierState, query_router};

    fn state() -> InMemoryQuerierState {
        let config = TestConfigBuilder::new().build();
        let store = Arc::new(InMemoryMetricStore::new(1));
        for (path, values) in [("m.a", [1.0, 2.0, 3.0]), ("m.b", [3.0, 4.0, 5.0])] {
            for (ts, value) in values.into_iter().enumerate() {
                store.insert("acme", path, ts as i64, value).unwrap();
            }
        }
        InMemoryQuerierState::with_store(&config, store)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_render_json() {
        let app = query_router(state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/render?target=averageSeries(m.*)&from=0&until=3&tenant=acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(
            body,
            serde_json::json!([{
                "target": "averageSeries(m.*)",
                "datapoints": [[2.0, 0], [3.0, 1], [4.0, 2]]
            }])
        );
    }

    #[tokio::test]
    async fn test_render_form_post_with_tenant_header() {
        let app = query_router(state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/render")
                    .header("x-tenant-id", "acme")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("target=m.b&from=0&until=3&format=raw"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(body_string(response).await, "m.b,0,3,1|3,4,5\n");
    }

    #[tokio::test]
    async fn test_unparseable_target_is_400() {
        let app = query_router(state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/render?target=sumSeries(m.*&from=0&until=3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "invalid_parameter");
        assert!(body["message"].as_str().unwrap().contains("sumSeries(m.*"));
    }

    #[tokio::test]
    async fn test_missing_target_is_400() {
        let app = query_router(state());
        let response = app
            .oneshot(Request::builder().uri("/render").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_health() {
        let app = query_router(state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(body_string(response).await, "OK");
    }
}
