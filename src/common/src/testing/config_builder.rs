//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::Configuration;

/// Builder for creating test configurations.
///
/// Starts from the defaults with stats reporting switched off, so tests do
/// not spawn the periodic reporter unless they ask for it.
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.stats.enabled = false;
        Self { config }
    }

    /// Set the per-request evaluation deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.querier.request_timeout = timeout;
        self
    }

    /// Render human-facing formats with unit suffixes.
    pub fn with_human_readable_numbers(mut self) -> Self {
        self.config.querier.human_readable_numbers = true;
        self
    }

    /// Bound the number of concurrent evaluations.
    pub fn with_max_concurrent_evaluations(mut self, max: usize) -> Self {
        self.config.querier.max_concurrent_evaluations = max;
        self
    }

    /// Limit how deeply targets may nest function calls.
    pub fn with_max_expression_depth(mut self, depth: usize) -> Self {
        self.config.querier.max_expression_depth = depth;
        self
    }

    /// Limit the time span of one request.
    pub fn with_max_range(mut self, range: Duration) -> Self {
        self.config.querier.max_range = range;
        self
    }

    /// Enable throttling with a QPS budget for one tenant.
    pub fn with_throttling(mut self, tenant: &str, qps: f64) -> Self {
        self.config.throttling.enabled = true;
        self.config.throttling.tenants.insert(tenant.to_string(), qps);
        self
    }

    /// Turn the computed throttling delay into a rejection.
    pub fn with_enforced_throttling(mut self) -> Self {
        self.config.throttling.enforce = true;
        self
    }

    /// Set the step of the in-memory store.
    pub fn with_storage_resolution(mut self, resolution: Duration) -> Self {
        self.config.storage.resolution = resolution;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
