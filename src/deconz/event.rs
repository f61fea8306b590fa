use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One message from the gateway's event WebSocket, as it appears on the
/// wire. The `state` payload is left raw; its shape depends on the type
/// of the originating device and is decoded separately.
// API: https://dresden-elektronik.github.io/deconz-rest-doc/endpoints/websocket/
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "t")]
    pub r#type: String,
    #[serde(rename = "e")]
    pub kind: EventKind,
    #[serde(rename = "r")]
    pub resource: Resource,
    #[serde(default, deserialize_with = "numeric_id")]
    pub id: u32,
    #[serde(rename = "uniqueid", default)]
    pub unique_id: String,
    #[serde(default)]
    pub state: Option<Value>,
}

// The gateway encodes the numeric resource id as a JSON string.
fn numeric_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Changed,
    Added,
    #[serde(other)]
    Other,
}

/// Top-level resource category of an event. Everything the pipeline does
/// not know how to resolve is folded into `Unknown` and dropped upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Sensors,
    Lights,
    Groups,
    #[serde(other)]
    Unknown,
}

impl Resource {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Resource::Unknown)
    }
}

/// A fully decoded gateway event: envelope metadata plus the state
/// payload interpreted according to the originating device's type.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub resource: Resource,
    pub id: u32,
    pub unique_id: String,
    pub state: TypedState,
}

/// The closed catalogue of state payload shapes.
///
/// `Empty` stands in whenever there is nothing to decode: the payload was
/// absent (battery-only updates do this a lot), the resource category is
/// unsupported, or the device type tag is not in the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedState {
    Fire(FireState),
    Temperature(TemperatureState),
    Pressure(PressureState),
    Humidity(HumidityState),
    Water(WaterState),
    Switch(SwitchState),
    Presence(PresenceState),
    OpenClose(OpenCloseState),
    Daylight(DaylightState),
    GenericStatus(String),
    Light(LightState),
    Empty,
}

impl TypedState {
    pub fn is_empty(&self) -> bool {
        matches!(self, TypedState::Empty)
    }
}

/// Smoke detector.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FireState {
    pub fire: bool,
    #[serde(rename = "lowbattery")]
    pub low_battery: bool,
    pub tampered: bool,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// Temperature reading in hundredths of a degree Celsius.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TemperatureState {
    pub temperature: i32,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PressureState {
    pub pressure: i32,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// Relative humidity in hundredths of a percent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HumidityState {
    pub humidity: i32,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// Flood sensor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WaterState {
    pub water: bool,
    #[serde(rename = "lowbattery")]
    pub low_battery: bool,
    pub tampered: bool,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// Button or wireless switch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SwitchState {
    #[serde(rename = "buttonevent")]
    pub button_event: i32,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

impl SwitchState {
    /// Interprets the raw button-event code. Codes outside the click set
    /// (long presses, releases, vendor extras) map to `None`.
    pub fn click(&self) -> Option<Click> {
        match self.button_event {
            1002 => Some(Click::Single),
            1004 => Some(Click::Double),
            1005 => Some(Click::Triple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    Single,
    Double,
    Triple,
}

/// Motion sensor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PresenceState {
    pub presence: bool,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// Door/window contact sensor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpenCloseState {
    pub open: bool,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// The gateway's built-in daylight sensor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaylightState {
    pub daylight: bool,
    pub status: i32,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}

/// Light state change. Changed events carry only the fields that moved,
/// so everything falls back to its zero value when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightState {
    pub on: bool,
    pub bri: u8,
    pub ct: u16,
    #[serde(rename = "colormode")]
    pub color_mode: Option<String>,
    pub reachable: bool,
    #[serde(rename = "lastupdated")]
    pub last_updated: Option<String>,
}
