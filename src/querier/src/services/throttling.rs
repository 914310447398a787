//! Per-tenant request pacing

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use common::config::ThrottlingConfig;
use tokio::time::Instant;

/// Computes how long a tenant's request would have to wait.
pub trait ThrottlingService: Send + Sync {
    /// Reserve the tenant's next slot and return the wait in seconds
    /// (`0.0` when the request is within budget).
    fn throttle(&self, tenant: &str) -> f64;
}

/// Token bucket with a bucket size of one: each tenant gets one request per
/// `1 / qps` seconds and a request arriving early is scheduled at the
/// tenant's next free slot.
#[derive(Debug)]
pub struct TokenBucketThrottler {
    config: ThrottlingConfig,
    next_free: Mutex<HashMap<String, Instant>>,
}

impl TokenBucketThrottler {
    pub fn new(config: ThrottlingConfig) -> Self {
        Self {
            config,
            next_free: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.config.enabled && self.config.enforce
    }
}

impl ThrottlingService for TokenBucketThrottler {
    fn throttle(&self, tenant: &str) -> f64 {
        if !self.config.enabled {
            return 0.0;
        }
        let Some(qps) = self.config.qps_for(tenant) else {
            return 0.0;
        };
        if qps.is_nan() || qps <= 0.0 {
            return 0.0;
        }

        let Ok(interval) = Duration::try_from_secs_f64(1.0 / qps) else {
            return 0.0;
        };
        let now = Instant::now();
        let mut next_free = self
            .next_free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Tenants whose slot has passed are back to a full budget
        next_free.retain(|_, slot| *slot > now);
        let slot = next_free.get(tenant).copied().unwrap_or(now);
        let Some(next) = slot.checked_add(interval) else {
            return 0.0;
        };
        next_free.insert(tenant.to_string(), next);

        (slot - now).as_secs_f64()
    }
}
