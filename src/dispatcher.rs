use crate::app_config::{ContactSensor, Devices, MotionSensor, SwitchSensor};
use crate::bus::MessageBus;
use crate::deconz::{Click, DeviceEvent, TypedState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumes the combined device/event queue and republishes configured
/// state transitions on the bus.
///
/// Every matching event updates the per-device record, and exactly one
/// message goes out per mapped transition, carrying the payload literal
/// configured for that device. Events for unconfigured devices and empty
/// states fall through without a publish.
pub struct Dispatcher {
    bus: Arc<dyn MessageBus>,
    contact_topic: String,
    motion_topic: String,
    switch_topic: String,
    contacts: HashMap<String, ContactRecord>,
    motions: HashMap<String, MotionRecord>,
    switches: HashMap<String, SwitchRecord>,
}

struct ContactRecord {
    #[allow(dead_code)]
    last_seen: DateTime<Utc>,
    open: bool,
    config: ContactSensor,
}

struct MotionRecord {
    #[allow(dead_code)]
    last_seen: DateTime<Utc>,
    motion: bool,
    config: MotionSensor,
}

struct SwitchRecord {
    #[allow(dead_code)]
    last_seen: DateTime<Utc>,
    button_event: i32,
    config: SwitchSensor,
}

enum Category {
    Contact,
    Motion,
    Switch,
}

impl Dispatcher {
    pub fn new(devices: &Devices, bus: Arc<dyn MessageBus>) -> Dispatcher {
        let now = Utc::now();

        let contacts = devices
            .contact()
            .iter()
            .map(|sensor| {
                (
                    sensor.id.clone(),
                    ContactRecord {
                        last_seen: now,
                        open: false,
                        config: sensor.clone(),
                    },
                )
            })
            .collect();
        let motions = devices
            .motion()
            .iter()
            .map(|sensor| {
                (
                    sensor.id.clone(),
                    MotionRecord {
                        last_seen: now,
                        motion: false,
                        config: sensor.clone(),
                    },
                )
            })
            .collect();
        let switches = devices
            .switches()
            .iter()
            .map(|sensor| {
                (
                    sensor.id.clone(),
                    SwitchRecord {
                        last_seen: now,
                        button_event: 0,
                        config: sensor.clone(),
                    },
                )
            })
            .collect();

        Dispatcher {
            bus,
            contact_topic: devices.contact_topic().to_string(),
            motion_topic: devices.motion_topic().to_string(),
            switch_topic: devices.switch_topic().to_string(),
            contacts,
            motions,
            switches,
        }
    }

    pub async fn run(mut self, mut rx: Receiver<DeviceEvent>, cancel: CancellationToken) {
        loop {
            let record = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(record) => record,
                    None => break,
                },
            };

            self.process(record).await;
        }

        debug!("Dispatcher loop ended");
    }

    async fn process(&mut self, record: DeviceEvent) {
        let DeviceEvent { device, event } = record;

        if event.state.is_empty() {
            return;
        }

        let outbound = if let Some(entry) = self.contacts.get_mut(&device.unique_id) {
            contact_transition(entry, &event.state)
        } else if let Some(entry) = self.motions.get_mut(&device.unique_id) {
            motion_transition(entry, &event.state)
        } else if let Some(entry) = self.switches.get_mut(&device.unique_id) {
            switch_transition(entry, &event.state)
        } else {
            debug!(
                "No configured device for '{}' ({}, path {})",
                device.name, device.unique_id, device.path_id
            );
            None
        };

        if let Some((category, payload)) = outbound {
            let topic = match category {
                Category::Contact => &self.contact_topic,
                Category::Motion => &self.motion_topic,
                Category::Switch => &self.switch_topic,
            };

            if let Err(e) = self.bus.publish(topic, payload.as_bytes()).await {
                warn!("Could not publish the state of '{}': {}", device.name, e);
            }
        }
    }
}

fn contact_transition(entry: &mut ContactRecord, state: &TypedState) -> Option<(Category, String)> {
    let TypedState::OpenClose(state) = state else {
        warn!("Contact sensor '{}' sent a state of the wrong shape", entry.config.name);
        return None;
    };

    let previous = entry.open;
    entry.open = state.open;
    entry.last_seen = Utc::now();
    info!("contact: {} -> {} = {}", entry.config.name, previous, state.open);

    let payload = if state.open { entry.config.open.clone() } else { entry.config.close.clone() };
    Some((Category::Contact, payload))
}

fn motion_transition(entry: &mut MotionRecord, state: &TypedState) -> Option<(Category, String)> {
    let TypedState::Presence(state) = state else {
        warn!("Motion sensor '{}' sent a state of the wrong shape", entry.config.name);
        return None;
    };

    let previous = entry.motion;
    entry.motion = state.presence;
    entry.last_seen = Utc::now();
    info!("motion: {} -> {} = {}", entry.config.name, previous, state.presence);

    let payload = if state.presence { entry.config.on.clone() } else { entry.config.off.clone() };
    Some((Category::Motion, payload))
}

fn switch_transition(entry: &mut SwitchRecord, state: &TypedState) -> Option<(Category, String)> {
    let TypedState::Switch(state) = state else {
        warn!("Switch '{}' sent a state of the wrong shape", entry.config.name);
        return None;
    };

    let previous = entry.button_event;
    entry.button_event = state.button_event;
    entry.last_seen = Utc::now();
    info!("switch: {} -> {} = {}", entry.config.name, previous, state.button_event);

    // Only the three click gestures carry configured payloads
    let payload = match state.click()? {
        Click::Single => entry.config.single_click.clone(),
        Click::Double => entry.config.double_click.clone(),
        Click::Triple => entry.config.triple_click.clone(),
    };
    Some((Category::Switch, payload))
}
