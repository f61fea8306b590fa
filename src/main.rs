use crate::app_config::AppConfig;
use crate::bus::ChannelBus;
use std::sync::Arc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod app_config;
mod bus;
mod deconz;
mod dispatcher;
mod domain;
mod liveness;
mod supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Arc::new(AppConfig::load());
    info!("✅  Loaded configuration");

    let (bus, mut bus_rx) = ChannelBus::new(config.core().queue_buffer_size());

    // Transport boundary: published messages are handed to whatever
    // broker the process is wired to; until one is attached they only
    // show up in the logs.
    task::spawn(async move {
        while let Some(message) = bus_rx.recv().await {
            debug!("📤 {} <- {}", message.topic, String::from_utf8_lossy(&message.payload));
        }
    });

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received ctrl-c, shutting down...");
            signal_token.cancel();
        }
    });

    info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));

    supervisor::supervise(config, Arc::new(bus), shutdown).await?;

    Ok(())
}
