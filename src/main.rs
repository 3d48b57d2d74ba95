use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use eth_tx_observer::api::{ApiServer, AppState};
use eth_tx_observer::blockchain::{BlockPoller, PollerConfig, RpcClient, TransactionFilter};
use eth_tx_observer::config::AppConfig;
use eth_tx_observer::logging::init_logging;
use eth_tx_observer::storage::{InMemoryStore, Storage};

#[derive(Parser)]
#[command(name = "observer")]
#[command(about = "Ethereum transaction observer for subscribed addresses")]
#[command(version)]
struct Args {
    /// Configuration file path (defaults to $CONFIG_FILE, then config.toml)
    #[arg(long)]
    config: Option<String>,

    /// HTTP API port
    #[arg(long)]
    port: Option<u16>,

    /// First block to watch when no watermark exists
    #[arg(long)]
    start_block: Option<u64>,

    /// Block polling interval in seconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.sample_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let mut config = match args.config.as_deref() {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(start_block) = args.start_block {
        config.processing.start_block = Some(start_block);
    }
    if let Some(interval) = args.poll_interval {
        config.processing.poll_interval_seconds = interval;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    info!("Starting transaction observer against {}", config.rpc.endpoint);

    let store: Arc<dyn Storage> = Arc::new(InMemoryStore::new(config.processing.unsubscribe_policy));
    let source = RpcClient::new_with_config(
        config.rpc.endpoint.clone(),
        config.rpc.timeout_seconds,
        config.rpc.request_id,
    )?;

    let shutdown = CancellationToken::new();
    let filter = TransactionFilter::with_log_sink(store.clone());
    let poller = BlockPoller::new(
        source,
        store.clone(),
        filter,
        PollerConfig::from(&config.processing),
    )
    .with_cancellation_token(shutdown.clone());
    let poller_handle = poller.handle();

    let poller_task = tokio::spawn(async move { poller.run().await });

    let api_task = if config.api.enabled {
        let state = AppState::new(store.clone()).with_poller(poller_handle.clone());
        let server = ApiServer::new(state, config.api.host.clone(), config.api.port);
        let token = shutdown.clone();
        Some(tokio::spawn(async move { server.start(token).await }))
    } else {
        info!("HTTP API disabled");
        None
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    // A fatal poller error takes the API server down with it.
    let poller_result = poller_task.await;
    shutdown.cancel();

    if let Some(task) = api_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("HTTP API server failed: {}", e),
            Err(e) => error!("HTTP API task panicked: {}", e),
        }
    }

    match poller_result {
        Ok(Ok(())) => {
            info!("Transaction observer stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Block poller failed: {}", e);
            Err(e.into())
        }
        Err(e) => Err(format!("block poller task panicked: {}", e).into()),
    }
}
