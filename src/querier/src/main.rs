use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use querier::serve_querier_http;
use tokio::sync::oneshot;

#[derive(Parser)]
#[command(name = "graphite-querier")]
#[command(about = "Graphite render service - evaluates target expressions over stored series")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<QuerierCommands>,

    #[arg(long, help = "Override the HTTP bind address from the configuration")]
    bind: Option<String>,
}

#[derive(Subcommand)]
enum QuerierCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for QuerierCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(bind) = cli.bind {
        config.querier.bind_addr = bind;
    }

    let command = cli.command.unwrap_or_default();
    let QuerierCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config)? {
        return Ok(());
    }

    utils::validate_config(&config)?;
    log::info!("Starting graphite querier service");

    let (init_tx, init_rx) = oneshot::channel::<()>();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (stopped_tx, stopped_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(serve_querier_http(config, init_tx, shutdown_rx, stopped_tx));

    if init_rx.await.is_err() {
        // The server exited before signalling readiness; surface its error.
        return server
            .await
            .context("Querier task panicked")?
            .context("Querier failed to start");
    }
    log::info!("Querier service started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c signal")?;
    log::info!("Shutting down querier service...");

    let _ = shutdown_tx.send(());
    let _ = stopped_rx.await;
    server.await.context("Querier task panicked")??;

    log::info!("Querier service stopped gracefully");
    Ok(())
}
