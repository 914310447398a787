use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use querier::serve_querier_http;
use tokio::sync::oneshot;

#[derive(Parser)]
#[command(name = "graphite-reader")]
#[command(about = "Graphite reader - single-process render server")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<ReaderCommands>,
}

#[derive(Subcommand)]
enum ReaderCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for ReaderCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    // Load application configuration
    let config = utils::load_config(cli.common.config.as_ref())?;

    // Handle common commands that don't require starting the service
    let command = cli.command.unwrap_or_default();
    let ReaderCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config)? {
        return Ok(());
    }

    utils::validate_config(&config)?;
    log::info!("Starting graphite reader");
    log::info!(
        "Request timeout {:?}, {} concurrent evaluations, throttling {}",
        config.querier.request_timeout,
        config.querier.max_concurrent_evaluations,
        if config.throttling.enabled { "on" } else { "off" }
    );

    let (querier_init_tx, querier_init_rx) = oneshot::channel::<()>();
    let (querier_shutdown_tx, querier_shutdown_rx) = oneshot::channel::<()>();
    let (querier_stopped_tx, querier_stopped_rx) = oneshot::channel::<()>();

    let querier_handle = tokio::spawn(serve_querier_http(
        config,
        querier_init_tx,
        querier_shutdown_rx,
        querier_stopped_tx,
    ));

    if querier_init_rx.await.is_err() {
        return querier_handle
            .await
            .context("Querier task panicked")?
            .context("Failed to start querier http server");
    }
    log::info!("Graphite reader started successfully");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c signal")?;
    log::info!("Shutting down graphite reader...");

    let _ = querier_shutdown_tx.send(());
    let _ = querier_stopped_rx.await;
    querier_handle.await.context("Querier task panicked")??;

    log::info!("Graphite reader stopped gracefully");
    Ok(())
}
