use crate::deconz::decoder::DecodeError;
use crate::deconz::directory::{DeviceDirectory, DirectoryError};
use crate::deconz::event::{Event, Resource};
use crate::domain::device::Device;
use crate::liveness::{Liveness, LivenessState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A resolved device paired with one decoded event from it. Lives only
/// until the dispatcher has processed it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub device: Device,
    pub event: Event,
}

/// What the reader needs to resolve the device behind an event.
#[async_trait]
pub trait DeviceLookup: Send + Sync {
    fn supports_resource(&self, resource: Resource) -> bool;

    async fn lookup_device(&self, id: &str) -> Result<Device, DirectoryError>;
}

#[async_trait]
impl DeviceLookup for DeviceDirectory {
    fn supports_resource(&self, resource: Resource) -> bool {
        DeviceDirectory::supports_resource(self, resource)
    }

    async fn lookup_device(&self, id: &str) -> Result<Device, DirectoryError> {
        DeviceDirectory::lookup_device(self, id).await
    }
}

/// One event-stream connection to the gateway, dialed and read one event
/// at a time.
#[async_trait]
pub trait EventSource: Send {
    async fn dial(&mut self) -> Result<(), SourceError>;

    async fn read_event(&mut self) -> Result<Event, SourceError>;

    async fn close(&mut self);
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("the stream was closed")]
    Closed,
}

impl SourceError {
    /// A recoverable error poisons one event, not the connection.
    pub fn recoverable(&self) -> bool {
        matches!(self, SourceError::Decode(_))
    }
}

/// Owns the event-stream connection and turns it into a stream of
/// `DeviceEvent`s.
///
/// The loop dials with a fixed delay between attempts (no backoff, no
/// attempt cap), reads until the connection drops, and redials. It stops
/// only on cancellation or when the output queue's receiver is gone; the
/// liveness flag tracks both exits so a supervisor can tell the
/// difference between "no events" and "no reader".
pub struct DeviceEventReader<S> {
    lookup: Arc<dyn DeviceLookup>,
    source: S,
    liveness: Arc<Liveness>,
    redial_delay: Duration,
    cancel: CancellationToken,
}

impl<S> DeviceEventReader<S>
where
    S: EventSource + 'static,
{
    pub fn new(
        lookup: Arc<dyn DeviceLookup>,
        source: S,
        liveness: Arc<Liveness>,
        redial_delay: Duration,
        cancel: CancellationToken,
    ) -> DeviceEventReader<S> {
        DeviceEventReader {
            lookup,
            source,
            liveness,
            redial_delay,
            cancel,
        }
    }

    /// Spawns the read loop. The liveness flag is set before the task is
    /// scheduled so a supervisor polling right away cannot observe a gap.
    pub fn start(self, tx: Sender<DeviceEvent>) -> Result<JoinHandle<()>, ReaderError> {
        if self.liveness.state() == LivenessState::Running {
            return Err(ReaderError::AlreadyRunning);
        }

        self.liveness.set_running();
        Ok(tokio::spawn(self.run(tx)))
    }

    async fn run(mut self, tx: Sender<DeviceEvent>) {
        'redial: loop {
            // Dialing
            loop {
                let dialed = tokio::select! {
                    _ = self.cancel.cancelled() => break 'redial,
                    result = self.source.dial() => result,
                };

                match dialed {
                    Ok(()) => {
                        info!("Gateway event stream connected");
                        break;
                    }
                    Err(e) => {
                        warn!("Could not connect to the gateway event stream: {}. Retrying in {:?}...", e, self.redial_delay);
                        tokio::select! {
                            _ = self.cancel.cancelled() => break 'redial,
                            _ = sleep(self.redial_delay) => {}
                        }
                    }
                }
            }

            // Connected
            loop {
                let read = tokio::select! {
                    _ = self.cancel.cancelled() => break 'redial,
                    result = self.source.read_event() => result,
                };

                let event = match read {
                    Ok(event) => event,
                    Err(e) if e.recoverable() => {
                        warn!("Dropping an event: {}", e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Gateway event stream lost: {}. Redialing...", e);
                        continue 'redial;
                    }
                };

                if !self.lookup.supports_resource(event.resource) {
                    debug!(
                        "Discarding an event for unsupported resource {:?} (id: {}, kind: {:?})",
                        event.resource, event.id, event.kind
                    );
                    continue;
                }

                let device = match self.lookup.lookup_device(&event.unique_id).await {
                    Ok(device) => device,
                    Err(e) => {
                        warn!("Dropping an event, could not resolve device '{}': {}", event.unique_id, e);
                        continue;
                    }
                };

                let emitted = tokio::select! {
                    _ = self.cancel.cancelled() => break 'redial,
                    result = tx.send(DeviceEvent { device, event }) => result,
                };

                if emitted.is_err() {
                    warn!("The event queue is closed, stopping the reader");
                    break 'redial;
                }
            }
        }

        self.source.close().await;
        self.liveness.set_stopped();
        info!("Gateway event stream closed");
    }
}

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("the reader is already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deconz::event::{EventKind, OpenCloseState, TypedState};
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_log::test;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const CONTACT_ID: &str = "00:15:8d:00:02:aa:bb:cc-01-0006";

    struct StubLookup {
        devices: HashMap<String, Device>,
    }

    impl StubLookup {
        fn with_contact() -> StubLookup {
            let device = Device {
                unique_id: CONTACT_ID.to_string(),
                r#type: "ZHAOpenClose".to_string(),
                name: "Front door".to_string(),
                path_id: "7".to_string(),
            };
            StubLookup {
                devices: HashMap::from([(device.unique_id.clone(), device)]),
            }
        }
    }

    #[async_trait]
    impl DeviceLookup for StubLookup {
        fn supports_resource(&self, resource: Resource) -> bool {
            resource.is_supported()
        }

        async fn lookup_device(&self, id: &str) -> Result<Device, DirectoryError> {
            self.devices
                .get(id)
                .cloned()
                .ok_or_else(|| DirectoryError::DeviceNotFound(id.to_string()))
        }
    }

    /// Plays a fixed script of dial results and events, then blocks
    /// forever.
    struct ScriptedSource {
        dial_failures: usize,
        dials: Arc<AtomicUsize>,
        events: VecDeque<Result<Event, SourceError>>,
    }

    impl ScriptedSource {
        fn new(dial_failures: usize, events: Vec<Result<Event, SourceError>>) -> (ScriptedSource, Arc<AtomicUsize>) {
            let dials = Arc::new(AtomicUsize::new(0));
            let source = ScriptedSource {
                dial_failures,
                dials: dials.clone(),
                events: events.into(),
            };
            (source, dials)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn dial(&mut self) -> Result<(), SourceError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            if self.dial_failures > 0 {
                self.dial_failures -= 1;
                return Err(SourceError::Connection("connection refused".to_string()));
            }
            Ok(())
        }

        async fn read_event(&mut self) -> Result<Event, SourceError> {
            match self.events.pop_front() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {}
    }

    fn contact_event(open: bool) -> Event {
        Event {
            kind: EventKind::Changed,
            resource: Resource::Sensors,
            id: 7,
            unique_id: CONTACT_ID.to_string(),
            state: TypedState::OpenClose(OpenCloseState {
                open,
                last_updated: None,
            }),
        }
    }

    fn reader(source: ScriptedSource, liveness: Arc<Liveness>, cancel: CancellationToken) -> DeviceEventReader<ScriptedSource> {
        DeviceEventReader::new(
            Arc::new(StubLookup::with_contact()),
            source,
            liveness,
            Duration::from_millis(5),
            cancel,
        )
    }

    #[test(tokio::test)]
    async fn a_connection_error_redials_and_keeps_reading() -> Result<(), ReaderError> {
        let (source, dials) = ScriptedSource::new(
            0,
            vec![
                Ok(contact_event(true)),
                Err(SourceError::Connection("reset by peer".to_string())),
                Ok(contact_event(false)),
            ],
        );
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        let handle = reader(source, liveness.clone(), cancel.clone()).start(tx)?;

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

        assert_eq!(first.event, contact_event(true));
        assert_eq!(second.event, contact_event(false));
        assert_eq!(dials.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(liveness.state(), LivenessState::Stopped);

        Ok(())
    }

    #[test(tokio::test)]
    async fn dialing_retries_until_the_source_accepts() -> Result<(), ReaderError> {
        let (source, dials) = ScriptedSource::new(3, vec![Ok(contact_event(true))]);
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        let handle = reader(source, liveness.clone(), cancel.clone()).start(tx)?;

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

        assert_eq!(received.device.name, "Front door");
        assert_eq!(dials.load(Ordering::SeqCst), 4);

        cancel.cancel();
        handle.await.unwrap();

        Ok(())
    }

    #[test(tokio::test)]
    async fn a_recoverable_error_skips_the_event_without_redialing() -> Result<(), ReaderError> {
        let parse_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let (source, dials) = ScriptedSource::new(
            0,
            vec![
                Err(SourceError::Decode(DecodeError::Envelope(parse_error))),
                Ok(contact_event(true)),
            ],
        );
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        let handle = reader(source, liveness.clone(), cancel.clone()).start(tx)?;

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

        assert_eq!(received.event, contact_event(true));
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();

        Ok(())
    }

    #[test(tokio::test)]
    async fn unresolvable_and_unsupported_events_are_dropped() -> Result<(), ReaderError> {
        let unknown_device = Event {
            unique_id: "ff:ff:ff:ff:ff:ff:ff:ff-01".to_string(),
            ..contact_event(true)
        };
        let unsupported = Event {
            resource: Resource::Unknown,
            ..contact_event(true)
        };
        let (source, _dials) = ScriptedSource::new(0, vec![Ok(unknown_device), Ok(unsupported), Ok(contact_event(false))]);
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(4);

        let handle = reader(source, liveness.clone(), cancel.clone()).start(tx)?;

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

        assert_eq!(received.event, contact_event(false));

        cancel.cancel();
        handle.await.unwrap();

        Ok(())
    }

    #[test(tokio::test)]
    async fn the_liveness_flag_follows_the_loop_lifetime() -> Result<(), ReaderError> {
        let (source, _dials) = ScriptedSource::new(0, vec![]);
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(4);

        assert_eq!(liveness.state(), LivenessState::NotStarted);

        let handle = reader(source, liveness.clone(), cancel.clone()).start(tx)?;
        assert_eq!(liveness.state(), LivenessState::Running);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(liveness.state(), LivenessState::Stopped);

        Ok(())
    }

    #[test(tokio::test)]
    async fn a_closed_queue_stops_the_loop_and_clears_the_flag() -> Result<(), ReaderError> {
        let (source, _dials) = ScriptedSource::new(0, vec![Ok(contact_event(true))]);
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let handle = reader(source, liveness.clone(), cancel.clone()).start(tx)?;
        handle.await.unwrap();

        assert_eq!(liveness.state(), LivenessState::Stopped);

        Ok(())
    }

    #[test(tokio::test)]
    async fn a_second_reader_on_the_same_flag_fails_fast() -> Result<(), ReaderError> {
        let (first_source, _) = ScriptedSource::new(0, vec![]);
        let (second_source, _) = ScriptedSource::new(0, vec![]);
        let liveness = Arc::new(Liveness::new());
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(4);

        let handle = reader(first_source, liveness.clone(), cancel.clone()).start(tx.clone())?;

        let second = reader(second_source, liveness.clone(), cancel.clone()).start(tx);
        assert!(matches!(second, Err(ReaderError::AlreadyRunning)));

        cancel.cancel();
        handle.await.unwrap();

        Ok(())
    }
}
