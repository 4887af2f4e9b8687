//! Vendo Kiosk
//!
//! Self-service vending front end: follows the card reader over MQTT,
//! shows the card holder's balance, and places orders with the backend.

mod backend;
mod config;
mod screen;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use backend::BackendBalance;
use clap::Parser;
use config::{ConfigLoader, Overrides};
use screen::KioskScreen;
use shutdown::shutdown_signal;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vendo_core::events::{balance_event_channel, transport_event_channel};
use vendo_core::processors::{BalanceWatcher, CardSessionDriver, TransportChannel};
use vendo_sdk::client::{KioskClient, StaticCredential};

/// Vendo Kiosk - card-operated vending front end
#[derive(Parser, Debug)]
#[command(name = "vendo-kiosk")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./vendo-config.toml")]
    config: PathBuf,

    /// Override the card reader broker host
    #[arg(long, env = "VENDO_BROKER_HOST")]
    broker_host: Option<String>,

    /// Override the card reader broker port
    #[arg(long, env = "VENDO_BROKER_PORT")]
    broker_port: Option<u16>,

    /// Override the vending backend base URL
    #[arg(long, env = "VENDO_BACKEND_URL")]
    backend_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting vendo-kiosk v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(
        &args.config,
        Overrides {
            broker_host: args.broker_host,
            broker_port: args.broker_port,
            backend_url: args.backend_url,
        },
    );
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let http = reqwest::Client::builder()
        .timeout(loaded_config.backend.request_timeout)
        .build()?;
    let mut client = KioskClient::new(loaded_config.backend.base_url.clone()).with_http_client(http);
    if let Some(admin_id) = loaded_config.backend.admin_id.clone() {
        client = client.with_credentials(Arc::new(StaticCredential(admin_id)));
    }
    tracing::info!(backend = %loaded_config.backend.base_url, "Backend client ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (transport_tx, transport_rx) = transport_event_channel();
    let (balance_tx, balance_rx) = balance_event_channel();

    let transport = TransportChannel::new(loaded_config.broker, transport_tx);
    let (driver, session_view) = CardSessionDriver::new(loaded_config.session);
    let driver = driver.with_balance_events(balance_tx.clone());
    let (watcher, balance_view) = BalanceWatcher::new(Arc::new(BackendBalance::new(client.clone())));

    let handles = [
        tokio::spawn(transport.run(shutdown_rx.clone())),
        tokio::spawn(driver.run(shutdown_rx.clone(), transport_rx)),
        tokio::spawn(watcher.run(shutdown_rx.clone(), balance_rx)),
    ];

    let screen = KioskScreen::new(
        client,
        session_view,
        balance_view,
        balance_tx,
        loaded_config.dispense,
    );

    let result = tokio::select! {
        result = screen.run(shutdown_rx.clone()) => result.map_err(anyhow::Error::from),
        signal = shutdown_signal() => signal.map_err(anyhow::Error::from),
    };

    tracing::info!("Stopping processors...");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Processor task failed: {}", e);
        }
    }
    tracing::info!("Kiosk shutdown complete");

    result
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rumqttc=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
