use crate::app_config::AppConfig;
use crate::bus::MessageBus;
use crate::deconz::{ClientError, Decoder, DeviceDirectory, DeviceEventReader, GatewayClient, ReaderError, WsEventSource};
use crate::dispatcher::Dispatcher;
use crate::liveness::Liveness;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the lifetime of one reader+dispatcher instance and polls its
/// liveness flag. When the flag reports "not running" while a stream was
/// expected, the whole instance is torn down and rebuilt from scratch —
/// including the device directory, which starts cold again. Recovery
/// above the connection level is deliberately this coarse.
pub async fn supervise(
    config: Arc<AppConfig>,
    bus: Arc<dyn MessageBus>,
    shutdown: CancellationToken,
) -> Result<(), SuperviseError> {
    loop {
        let client = GatewayClient::new(config.deconz().host(), config.deconz().api_key())?;

        let ws_url = match config.deconz().ws_url() {
            Some(url) => url.to_string(),
            None => match client.websocket_url().await {
                Ok(url) => url,
                Err(e) => {
                    warn!(
                        "Could not discover the gateway WebSocket: {}. Retrying in {:?}...",
                        e,
                        config.core().restart_delay()
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = sleep(config.core().restart_delay()) => continue,
                    }
                }
            },
        };

        info!("Starting an event reader instance against {}", ws_url);

        let directory = Arc::new(DeviceDirectory::new(client, config.deconz().refresh_on_miss()));
        let source = WsEventSource::new(ws_url, Decoder::new(directory.clone()));

        let liveness = Arc::new(Liveness::new());
        let instance_cancel = shutdown.child_token();
        let (tx, rx) = mpsc::channel(config.core().queue_buffer_size());

        let reader = DeviceEventReader::new(
            directory.clone(),
            source,
            liveness.clone(),
            config.deconz().redial_delay(),
            instance_cancel.clone(),
        );
        let reader_handle = reader.start(tx)?;

        let dispatcher = Dispatcher::new(config.devices(), bus.clone());
        let dispatcher_handle = tokio::spawn(dispatcher.run(rx, instance_cancel.clone()));

        let mut check = interval(config.core().check_interval());
        check.tick().await; // the first tick completes immediately

        let stalled = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break false,
                _ = check.tick() => {
                    if !liveness.is_running() {
                        warn!("The event reader is not running, restarting the whole instance");
                        break true;
                    }
                }
            }
        };

        instance_cancel.cancel();
        let _ = reader_handle.await;
        let _ = dispatcher_handle.await;

        if !stalled {
            info!("Shutdown requested, supervisor exiting");
            return Ok(());
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = sleep(config.core().restart_delay()) => {}
        }

        info!("Restarting...");
    }
}

#[derive(Error, Debug)]
pub enum SuperviseError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Reader(#[from] ReaderError),
}
