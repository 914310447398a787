use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Settings for the render path
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuerierConfig {
    /// Address the HTTP server listens on
    pub bind_addr: String,
    /// Hard deadline for evaluating all targets of one request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Render values with unit suffixes in human-facing formats
    pub human_readable_numbers: bool,
    /// Number of evaluations allowed to run at the same time
    pub max_concurrent_evaluations: usize,
    /// Deepest function nesting accepted in one target
    pub max_expression_depth: usize,
    /// Widest `from`..`until` span a request may ask for
    #[serde(with = "humantime_serde")]
    pub max_range: Duration,
}

impl Default for QuerierConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::from("0.0.0.0:8080"),
            request_timeout: Duration::from_secs(30),
            human_readable_numbers: false,
            max_concurrent_evaluations: 64,
            max_expression_depth: 128,
            max_range: Duration::from_secs(365 * 86_400),
        }
    }
}

/// Smallest QPS budget accepted by validation, about one request per 11 days
pub const MIN_QPS: f64 = 1e-6;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    pub enabled: bool,
    /// Queries per second granted to tenants without an explicit entry
    pub default_qps: f64,
    /// Per-tenant QPS overrides
    pub tenants: HashMap<String, f64>,
    /// Tenants that are never throttled
    pub exceptions: Vec<String>,
    /// Reject requests that would have to wait instead of only recording the delay
    pub enforce: bool,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_qps: 20.0,
            tenants: HashMap::new(),
            exceptions: Vec::new(),
            enforce: false,
        }
    }
}

impl ThrottlingConfig {
    /// QPS budget for a tenant, `None` when the tenant is exempt.
    pub fn qps_for(&self, tenant: &str) -> Option<f64> {
        if self.exceptions.iter().any(|t| t == tenant) {
            return None;
        }
        Some(self.tenants.get(tenant).copied().unwrap_or(self.default_qps))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsConfig {
    pub enabled: bool,
    /// How often per-tenant counters are reported and reset
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Step of the series held by the in-memory store
    #[serde(with = "humantime_serde")]
    pub resolution: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            resolution: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    pub querier: QuerierConfig,
    pub throttling: ThrottlingConfig,
    pub stats: StatsConfig,
    pub storage: StorageConfig,
}

impl Configuration {
    fn base() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::base()
            .merge(Toml::file("graphite-reader.toml"))
            .merge(Env::prefixed("GRAPHITE_READER__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::base()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRAPHITE_READER__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
