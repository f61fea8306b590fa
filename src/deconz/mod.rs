mod client;
mod decoder;
mod directory;
mod event;
mod reader;
mod socket;

pub use client::{ClientError, GatewayClient};
pub use decoder::{DecodeError, Decoder, TypeLookup};
pub use directory::{DeviceDirectory, DirectoryError};
pub use event::{
    Click, DaylightState, Event, EventKind, FireState, HumidityState, LightState, OpenCloseState, PresenceState,
    PressureState, Resource, SwitchState, TemperatureState, TypedState, WaterState,
};
pub use reader::{DeviceEvent, DeviceEventReader, DeviceLookup, EventSource, ReaderError, SourceError};
pub use socket::WsEventSource;
