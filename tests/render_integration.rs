//! End-to-end render scenarios through the envelope and the HTTP router.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::model::TimeSeries;
use common::testing::TestConfigBuilder;
use querier::render::{OutputFormat, RenderError, RenderOutcome, RenderParameters};
use querier::services::{MetricStore, StorageError};
use querier::{InMemoryQuerierState, QuerierState, query_router};
use tower::ServiceExt;

/// Answers exact patterns from a fixed map and counts every fetch.
#[derive(Default)]
struct FixtureStore {
    series: HashMap<String, Vec<TimeSeries>>,
    calls: AtomicUsize,
}

impl FixtureStore {
    fn with(mut self, pattern: &str, series: Vec<TimeSeries>) -> Self {
        self.series.insert(pattern.to_string(), series);
        self
    }
}

#[async_trait]
impl MetricStore for FixtureStore {
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

/// Sets its flag when dropped, i.e. when the fetch future is torn down.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never answers within any reasonable deadline.
#[derive(Default)]
struct SlowStore {
    started: AtomicUsize,
    dropped: Arc<AtomicBool>,
    finished: AtomicBool,
}

#[async_trait]
impl MetricStore for SlowStore {
    async fn fetch(
        &self,
        _tenant: &str,
        _pattern: &str,
        _from: i64,
        _until: i64,
    ) -> Result<Vec<TimeSeries>, StorageError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _guard = DropFlag(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn series(name: &str, values: &[Option<f64>]) -> TimeSeries {
    TimeSeries::new(name, 0, values.len() as i64, 1).with_values(values.to_vec())
}

fn params(targets: &[&str]) -> RenderParameters {
    RenderParameters {
        tenant: "acme".to_string(),
        targets: targets.iter().map(|t| t.to_string()).collect(),
        from: 0,
        until: 3,
        format: OutputFormat::Json,
    }
}

fn datapoints(body: &str) -> Vec<(String, Vec<Option<f64>>)> {
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            let name = entry["target"].as_str().unwrap().to_string();
            let values = entry["datapoints"]
                .as_array()
                .unwrap()
                .iter()
                .map(|point| point[0].as_f64())
                .collect();
            (name, values)
        })
        .collect()
}

async fn completed(state: &InMemoryQuerierState, targets: &[&str]) -> Vec<(String, Vec<Option<f64>>)> {
    match state.render_handler().handle(params(targets)).await {
        RenderOutcome::Completed(response) => datapoints(&response.body),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_average_with_missing_sample() {
    let store = FixtureStore::default().with(
        "m.*",
        vec![
            series("m.a", &[Some(1.0), Some(2.0), None]),
            series("m.b", &[Some(3.0), Some(4.0), Some(5.0)]),
        ],
    );
    let state = InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), Arc::new(store));

    let result = completed(&state, &["averageSeries(m.*)"]).await;
    assert_eq!(
        result,
        vec![(
            "averageSeries(m.*)".to_string(),
            vec![Some(2.0), Some(3.0), Some(2.5)]
        )]
    );
}

#[tokio::test]
async fn test_average_is_arithmetic_mean_when_complete() {
    let inputs: Vec<Vec<f64>> = vec![
        vec![0.5, -2.0, 10.0, 7.0],
        vec![1.5, 4.0, 20.0, 7.0],
        vec![4.0, 1.0, -30.0, 7.0],
        vec![2.0, 9.0, 0.0, 7.0],
    ];
    let list = inputs
        .iter()
        .enumerate()
        .map(|(i, values)| {
            let values: Vec<_> = values.iter().copied().map(Some).collect();
            series(&format!("p.s{i}"), &values)
        })
        .collect();
    let store = FixtureStore::default().with("p.*", list);
    let state = InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), Arc::new(store));

    let result = completed(&state, &["averageSeries(p.*)"]).await;
    for i in 0..4 {
        let mean = inputs.iter().map(|v| v[i]).sum::<f64>() / inputs.len() as f64;
        assert_eq!(result[0].1[i], Some(mean), "index {i}");
    }
}

#[tokio::test]
async fn test_nested_expression_named_by_outermost_call() {
    let store = FixtureStore::default()
        .with(
            "a.*",
            vec![
                series("a.1", &[Some(1.0), Some(2.0)]),
                series("a.2", &[Some(3.0), Some(4.0)]),
            ],
        )
        .with("b.*", vec![series("b.1", &[Some(10.0), Some(20.0)])]);
    let state = InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), Arc::new(store));

    let result = completed(
        &state,
        &["alias(averageSeries(sumSeries(a.*, b.*)), 'total')", "averageSeries(sum(a.*, b.*))"],
    )
    .await;
    assert_eq!(
        result,
        vec![
            ("total".to_string(), vec![Some(14.0), Some(26.0)]),
            (
                "averageSeries(sum(a.*,b.*))".to_string(),
                vec![Some(14.0), Some(26.0)]
            ),
        ]
    );
}

#[tokio::test]
async fn test_unparseable_target_never_reaches_storage() {
    let store = Arc::new(FixtureStore::default());
    let state = InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), store.clone());

    let outcome = state
        .render_handler()
        .handle(params(&["a.b", "averageSeries(a.*))"]))
        .await;
    let RenderOutcome::Failed(RenderError::InvalidParameter(message)) = outcome else {
        panic!("expected a parameter error, got {outcome:?}");
    };
    assert!(message.contains("averageSeries(a.*))"), "{message}");
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);

    let response = query_router(state)
        .oneshot(
            Request::builder()
                .uri("/render?target=averageSeries(a.*&tenant=acme&from=0&until=3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_evaluation_and_counts_once() {
    let store = Arc::new(SlowStore::default());
    let config = TestConfigBuilder::new()
        .with_request_timeout(Duration::from_millis(50))
        .build();
    let state = InMemoryQuerierState::with_store(&config, store.clone());

    let outcome = state
        .render_handler()
        .handle(params(&["averageSeries(slow.*)"]))
        .await;
    assert!(matches!(outcome, RenderOutcome::TimedOut), "{outcome:?}");
    assert_eq!(state.stats().tenant("acme").timed_out_requests, 1);
    assert_eq!(state.stats().tenant("acme").render_requests, 1);

    // The aborted task is torn down the next time the scheduler runs it
    for _ in 0..10 {
        if store.dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(store.started.load(Ordering::SeqCst), 1);
    assert!(store.dropped.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert!(!store.finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_413_with_empty_body() {
    let store = Arc::new(SlowStore::default());
    let config = TestConfigBuilder::new()
        .with_request_timeout(Duration::from_millis(50))
        .build();
    let state = InMemoryQuerierState::with_store(&config, store);
    let stats = state.stats().clone();

    let response = query_router(state)
        .oneshot(
            Request::builder()
                .uri("/render?target=slow.metric&tenant=acme&from=0&until=60")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
    assert_eq!(stats.tenant("acme").timed_out_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_for_a_worker_counts_toward_the_deadline() {
    let store = Arc::new(SlowStore::default());
    let config = TestConfigBuilder::new()
        .with_request_timeout(Duration::from_millis(50))
        .with_max_concurrent_evaluations(1)
        .build();
    let state = InMemoryQuerierState::with_store(&config, store.clone());

    let (first, second) = tokio::join!(
        state.render_handler().handle(params(&["slow.a"])),
        state.render_handler().handle(params(&["slow.b"])),
    );
    assert!(matches!(first, RenderOutcome::TimedOut));
    assert!(matches!(second, RenderOutcome::TimedOut));
    assert_eq!(store.started.load(Ordering::SeqCst), 1);
    assert_eq!(state.stats().tenant("acme").timed_out_requests, 2);
}

#[tokio::test]
async fn test_storage_failure_is_internal_error() {
    struct BrokenStore;

    #[async_trait]
    impl MetricStore for BrokenStore {
        async fn fetch(
            &self,
            _tenant: &str,
            _pattern: &str,
            _from: i64,
            _until: i64,
        ) -> Result<Vec<TimeSeries>, StorageError> {
            Err(StorageError::Unavailable("backend down".to_string()))
        }
    }

    let state =
        InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), Arc::new(BrokenStore));
    let response = query_router(state)
        .oneshot(
            Request::builder()
                .uri("/render?target=sumSeries(a.*)&from=0&until=60")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "internal_error");
    assert!(!body["message"].as_str().unwrap().contains("backend down"));
}

#[tokio::test]
async fn test_unaligned_input_is_bad_request() {
    let store = FixtureStore::default().with(
        "m.*",
        vec![
            series("m.a", &[Some(1.0), Some(2.0)]),
            TimeSeries::new("m.b", 0, 4, 2).with_values(vec![Some(1.0), Some(2.0)]),
        ],
    );
    let state = InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), Arc::new(store));

    let outcome = state.render_handler().handle(params(&["averageSeries(m.*)"])).await;
    assert!(
        matches!(outcome, RenderOutcome::Failed(RenderError::BadRequest(ref m)) if m.contains("not aligned")),
        "{outcome:?}"
    );
}

async fn status_of(state: InMemoryQuerierState, uri: &str) -> StatusCode {
    query_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_extreme_time_range_is_bad_request() {
    let config = TestConfigBuilder::new().build();
    let state = InMemoryQuerierState::new(&config);

    let uri = format!("/render?target=a.b&until={}", i64::MAX);
    assert_eq!(status_of(state.clone(), &uri).await, StatusCode::BAD_REQUEST);
    assert_eq!(
        status_of(state.clone(), "/render?target=a.b&from=-1000y").await,
        StatusCode::BAD_REQUEST
    );

    // A narrow window at the edge of the timestamp space still fits the range limit
    let uri = format!(
        "/render?target=a.b&from={}&until={}",
        i64::MAX - 10,
        i64::MAX
    );
    assert_eq!(status_of(state, &uri).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deeply_nested_target_is_bad_request() {
    let store = Arc::new(FixtureStore::default());
    let state = InMemoryQuerierState::with_store(&TestConfigBuilder::new().build(), store.clone());

    let depth = 5_000;
    let target = format!("{}a.b{}", "scale(".repeat(depth), ",1)".repeat(depth));
    let uri = format!("/render?target={target}&from=0&until=3");
    assert_eq!(status_of(state, &uri).await, StatusCode::BAD_REQUEST);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}
