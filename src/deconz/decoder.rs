use crate::deconz::directory::{DeviceDirectory, DirectoryError};
use crate::deconz::event::{Envelope, Event, Resource, TypedState};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// What the decoder needs to resolve a device type from an event's unique
/// id.
#[async_trait]
pub trait TypeLookup: Send + Sync {
    fn supports_resource(&self, resource: Resource) -> bool;

    async fn lookup_type(&self, id: &str) -> Result<String, DirectoryError>;
}

#[async_trait]
impl TypeLookup for DeviceDirectory {
    fn supports_resource(&self, resource: Resource) -> bool {
        DeviceDirectory::supports_resource(self, resource)
    }

    async fn lookup_type(&self, id: &str) -> Result<String, DirectoryError> {
        DeviceDirectory::lookup_type(self, id).await
    }
}

/// Decodes raw event envelopes into typed events.
///
/// The state payload's shape is not self-describing: it is selected by the
/// type of the originating device, which has to be resolved through the
/// type store first.
pub struct Decoder {
    store: Arc<dyn TypeLookup>,
}

impl Decoder {
    pub fn new(store: Arc<dyn TypeLookup>) -> Decoder {
        Decoder { store }
    }

    pub async fn decode(&self, raw: &[u8]) -> Result<Event, DecodeError> {
        let envelope = serde_json::from_slice::<Envelope>(raw).map_err(DecodeError::Envelope)?;
        let Envelope {
            kind,
            resource,
            id,
            unique_id,
            state,
            ..
        } = envelope;

        // No state to decode is common (battery-only updates, added
        // events) and not an error.
        if !self.store.supports_resource(resource) {
            debug!("Unsupported resource {:?} for event from '{}'", resource, unique_id);
            return Ok(Event {
                kind,
                resource,
                id,
                unique_id,
                state: TypedState::Empty,
            });
        }
        let Some(raw_state) = state else {
            return Ok(Event {
                kind,
                resource,
                id,
                unique_id,
                state: TypedState::Empty,
            });
        };

        let r#type = self.store.lookup_type(&unique_id).await?;
        let (resource, state) = match r#type.as_str() {
            "ZHAFire" => (resource, TypedState::Fire(decode_state(&r#type, raw_state)?)),
            "ZHATemperature" => (resource, TypedState::Temperature(decode_state(&r#type, raw_state)?)),
            "ZHAPressure" => (resource, TypedState::Pressure(decode_state(&r#type, raw_state)?)),
            "ZHAHumidity" => (resource, TypedState::Humidity(decode_state(&r#type, raw_state)?)),
            "ZHAWater" => (resource, TypedState::Water(decode_state(&r#type, raw_state)?)),
            "ZHASwitch" => (resource, TypedState::Switch(decode_state(&r#type, raw_state)?)),
            "ZHAPresence" | "CLIPPresence" => (resource, TypedState::Presence(decode_state(&r#type, raw_state)?)),
            "ZHAOpenClose" => (resource, TypedState::OpenClose(decode_state(&r#type, raw_state)?)),
            "Daylight" => (resource, TypedState::Daylight(decode_state(&r#type, raw_state)?)),
            "CLIPGenericStatus" => (resource, TypedState::GenericStatus(raw_state.to_string())),
            "Extended color light" | "Dimmable light" => (resource, TypedState::Light(decode_state(&r#type, raw_state)?)),
            unknown => {
                debug!("Device type '{}' is not in the decode catalogue", unknown);
                (Resource::Unknown, TypedState::Empty)
            }
        };

        Ok(Event {
            kind,
            resource,
            id,
            unique_id,
            state,
        })
    }
}

fn decode_state<T>(r#type: &str, value: Value) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(value).map_err(|source| DecodeError::State {
        r#type: r#type.to_string(),
        source,
    })
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unable to parse the event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("unable to decode a '{type}' state: {source}")]
    State {
        r#type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to resolve the device type: {0}")]
    Lookup(#[from] DirectoryError),
}
