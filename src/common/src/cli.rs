use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all services
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{Configuration, MIN_QPS};
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments
    ///
    /// `RUST_LOG` wins over the flags when it is set.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Graphite Reader Configuration:");
            println!("==============================");
            println!("Bind address: {}", config.querier.bind_addr);
            println!("Request timeout: {:?}", config.querier.request_timeout);
            println!(
                "Human readable numbers: {}",
                config.querier.human_readable_numbers
            );
            println!(
                "Max concurrent evaluations: {}",
                config.querier.max_concurrent_evaluations
            );
            println!(
                "Max expression depth: {}",
                config.querier.max_expression_depth
            );
            println!("Max time range: {:?}", config.querier.max_range);

            if config.throttling.enabled {
                println!("Throttling default QPS: {}", config.throttling.default_qps);
                println!("Throttling overrides: {}", config.throttling.tenants.len());
                println!("Throttling enforced: {}", config.throttling.enforce);
            } else {
                println!("Throttling: disabled");
            }

            if config.stats.enabled {
                println!("Stats interval: {:?}", config.stats.interval);
            } else {
                println!("Stats: disabled");
            }

            println!("Storage resolution: {:?}", config.storage.resolution);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        config
            .querier
            .bind_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid bind address: {}", config.querier.bind_addr))?;

        if config.querier.request_timeout.is_zero() {
            anyhow::bail!("Request timeout must be greater than zero");
        }

        if config.querier.max_concurrent_evaluations == 0 {
            anyhow::bail!("max_concurrent_evaluations must be at least 1");
        }

        if config.querier.max_expression_depth == 0 {
            anyhow::bail!("max_expression_depth must be at least 1");
        }

        if config.querier.max_range.as_secs() == 0 {
            anyhow::bail!("max_range must be at least one second");
        }

        if config.stats.enabled && config.stats.interval.is_zero() {
            anyhow::bail!("Stats interval must be greater than zero");
        }

        if config.storage.resolution.as_secs() == 0 {
            anyhow::bail!("Storage resolution must be at least one second");
        }

        if config.throttling.enabled {
            let non_positive = std::iter::once(&config.throttling.default_qps)
                .chain(config.throttling.tenants.values())
                .any(|qps| !qps.is_finite() || *qps < MIN_QPS);
            if non_positive {
                anyhow::bail!("Throttling QPS values must be finite and at least {MIN_QPS}");
            }
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
