use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use common::config::Configuration;
use query::graphite::{Evaluator, FunctionRegistry};
use render::RenderHandler;
use services::stats::spawn_reporter;
use services::{InMemoryMetricStore, InMemoryStats, MetricStore, TokenBucketThrottler};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod endpoints;
pub mod query;
pub mod render;
pub mod services;

pub trait QuerierState: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn render_handler(&self) -> &RenderHandler;
    /// Writable store for the plaintext ingest route, if the backend supports it
    fn metric_store(&self) -> Option<&InMemoryMetricStore>;
}

/// Shared state for the route handlers
#[derive(Clone)]
pub struct InMemoryQuerierState {
    render: Arc<RenderHandler>,
    store: Option<Arc<InMemoryMetricStore>>,
    stats: Arc<InMemoryStats>,
}

impl std::fmt::Debug for InMemoryQuerierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQuerierState")
            .field("render", &self.render)
            .field("store", &self.store.as_ref().map(|_| "InMemoryMetricStore"))
            .field("stats", &"InMemoryStats")
            .finish()
    }
}

impl InMemoryQuerierState {
    /// State backed by a fresh in-memory store at the configured resolution.
    pub fn new(config: &Configuration) -> Self {
        let store = Arc::new(InMemoryMetricStore::new(
            config.storage.resolution.as_secs() as i64,
        ));
        let mut state = Self::with_store(config, store.clone());
        state.store = Some(store);
        state
    }

    /// State reading from an arbitrary store; the ingest route is disabled.
    pub fn with_store(config: &Configuration, store: Arc<dyn MetricStore>) -> Self {
        let stats = Arc::new(InMemoryStats::new());
        let throttler = TokenBucketThrottler::new(config.throttling.clone());
        let enforce = throttler.is_enforced();
        let evaluator = Evaluator::new(store, Arc::new(FunctionRegistry::standard()));
        let render = RenderHandler::new(
            &config.querier,
            evaluator,
            Arc::new(throttler),
            stats.clone(),
        )
        .with_enforced_throttling(enforce);

        Self {
            render: Arc::new(render),
            store: None,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<InMemoryStats> {
        &self.stats
    }
}

impl QuerierState for InMemoryQuerierState {
    fn render_handler(&self) -> &RenderHandler {
        &self.render
    }

    fn metric_store(&self) -> Option<&InMemoryMetricStore> {
        self.store.as_deref()
    }
}

pub fn query_router<S: QuerierState>(state: S) -> Router {
    endpoints::router::<S>()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve_querier_http(
    config: Configuration,
    init_tx: oneshot::Sender<()>,
    shutdown_rx: oneshot::Receiver<()>,
    stopped_tx: oneshot::Sender<()>,
) -> Result<(), anyhow::Error> {
    let state = InMemoryQuerierState::new(&config);

    let reporter_shutdown = CancellationToken::new();
    let reporter = config.stats.enabled.then(|| {
        spawn_reporter(
            state.stats().clone(),
            config.stats.interval,
            reporter_shutdown.clone(),
        )
    });

    let addr = config.querier.bind_addr.as_str();
    log::info!("Starting querier on {addr}");

    let app = query_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind querier http server to {addr}"))?;

    init_tx
        .send(())
        .map_err(|_| anyhow::anyhow!("Unable to send init signal for querier http server"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            log::info!("Shutting down querier http server");
        })
        .await?;

    reporter_shutdown.cancel();
    if let Some(reporter) = reporter {
        reporter.await.ok();
    }

    stopped_tx
        .send(())
        .map_err(|_| anyhow::anyhow!("Unable to send stopped signal for querier http server"))?;

    Ok(())
}
