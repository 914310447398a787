//! Per-tenant request counters
//!
//! Recording is fire-and-forget: a stats call never blocks on I/O and never
//! fails the request that makes it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub trait StatsService: Send + Sync {
    fn inc_render_requests(&self, tenant: &str);
    fn inc_throttle_time(&self, tenant: &str, seconds: f64);
    fn inc_timed_out_requests(&self, tenant: &str);
}

#[derive(Debug, Default)]
struct TenantCounters {
    render_requests: AtomicU64,
    throttle_micros: AtomicU64,
    timed_out_requests: AtomicU64,
}

impl TenantCounters {
    fn load(&self) -> TenantStats {
        TenantStats {
            render_requests: self.render_requests.load(Ordering::Relaxed),
            throttle_time: self.throttle_micros.load(Ordering::Relaxed) as f64 / 1e6,
            timed_out_requests: self.timed_out_requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one tenant's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TenantStats {
    pub render_requests: u64,
    /// Seconds of computed throttle delay
    pub throttle_time: f64,
    pub timed_out_requests: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryStats {
    tenants: RwLock<HashMap<String, Arc<TenantCounters>>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, tenant: &str) -> Arc<TenantCounters> {
        let existing = self
            .tenants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(tenant)
            .cloned();
        if let Some(counters) = existing {
            return counters;
        }
        self.tenants
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(tenant.to_string())
            .or_default()
            .clone()
    }

    pub fn snapshot(&self) -> BTreeMap<String, TenantStats> {
        self.tenants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(tenant, counters)| (tenant.clone(), counters.load()))
            .collect()
    }

    /// Current values, forgetting every tenant.
    pub fn reset(&self) -> BTreeMap<String, TenantStats> {
        let drained = std::mem::take(
            &mut *self
                .tenants
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        drained
            .into_iter()
            .map(|(tenant, counters)| (tenant, counters.load()))
            .collect()
    }

    #[cfg(test)]
    fn tracked_tenants(&self) -> usize {
        self.tenants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn tenant(&self, tenant: &str) -> TenantStats {
        self.snapshot().remove(tenant).unwrap_or_default()
    }
}

impl StatsService for InMemoryStats {
    fn inc_render_requests(&self, tenant: &str) {
        self.counters(tenant)
            .render_requests
            .fetch_add(1, Ordering::Relaxed);
    }

    fn inc_throttle_time(&self, tenant: &str, seconds: f64) {
        if seconds.is_nan() || seconds <= 0.0 {
            return;
        }
        self.counters(tenant)
            .throttle_micros
            .fetch_add((seconds * 1e6).round() as u64, Ordering::Relaxed);
    }

    fn inc_timed_out_requests(&self, tenant: &str) {
        self.counters(tenant)
            .timed_out_requests
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Log and reset the counters every `interval` until `shutdown` fires.
pub fn spawn_reporter(
    stats: Arc<InMemoryStats>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // `interval` panics on a zero period
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for (tenant, s) in stats.reset() {
                        tracing::info!(
                            tenant = %tenant,
                            render_requests = s.render_requests,
                            throttle_time = s.throttle_time,
                            timed_out_requests = s.timed_out_requests,
                            "Tenant stats"
                        );
                    }
                }
            }
        }
        tracing::debug!("Stats reporter stopped");
    })
}
