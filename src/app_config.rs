use config::Config;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    core: Core,
    deconz: Deconz,
    devices: Devices,
}

impl AppConfig {
    pub fn load() -> Self {
        Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::default())
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn deconz(&self) -> &Deconz {
        &self.deconz
    }

    pub fn devices(&self) -> &Devices {
        &self.devices
    }
}

#[derive(Debug, Deserialize)]
pub struct Core {
    queue_buffer_size: usize,
    check_interval_ms: u64,
    restart_delay_ms: u64,
}

impl Core {
    pub fn queue_buffer_size(&self) -> usize {
        self.queue_buffer_size
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct Deconz {
    host: String,
    api_key: String,
    // Overrides WebSocket discovery through the gateway's config resource
    #[serde(default)]
    ws_url: Option<String>,
    redial_delay_ms: u64,
    #[serde(default)]
    refresh_on_miss: bool,
}

impl Deconz {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn ws_url(&self) -> Option<&str> {
        self.ws_url.as_deref()
    }

    pub fn redial_delay(&self) -> Duration {
        Duration::from_millis(self.redial_delay_ms)
    }

    pub fn refresh_on_miss(&self) -> bool {
        self.refresh_on_miss
    }
}

#[derive(Debug, Deserialize)]
pub struct Devices {
    contact_topic: String,
    motion_topic: String,
    switch_topic: String,
    #[serde(default)]
    contact: Vec<ContactSensor>,
    #[serde(default)]
    motion: Vec<MotionSensor>,
    #[serde(default)]
    switches: Vec<SwitchSensor>,
}

impl Devices {
    pub fn contact_topic(&self) -> &str {
        &self.contact_topic
    }

    pub fn motion_topic(&self) -> &str {
        &self.motion_topic
    }

    pub fn switch_topic(&self) -> &str {
        &self.switch_topic
    }

    pub fn contact(&self) -> &[ContactSensor] {
        &self.contact
    }

    pub fn motion(&self) -> &[MotionSensor] {
        &self.motion
    }

    pub fn switches(&self) -> &[SwitchSensor] {
        &self.switches
    }
}

/// Door/window sensor with its outbound payload literals.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactSensor {
    pub id: String,
    pub name: String,
    pub open: String,
    pub close: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionSensor {
    pub id: String,
    pub name: String,
    pub on: String,
    pub off: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchSensor {
    pub id: String,
    pub name: String,
    pub single_click: String,
    pub double_click: String,
    pub triple_click: String,
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                core: Core {
                    queue_buffer_size: 4,
                    check_interval_ms: 50,
                    restart_delay_ms: 50,
                },
                deconz: Deconz {
                    host: "127.0.0.1:80".to_string(),
                    api_key: "key".to_string(),
                    ws_url: None,
                    redial_delay_ms: 5,
                    refresh_on_miss: false,
                },
                devices: Devices {
                    contact_topic: "state/contact/".to_string(),
                    motion_topic: "state/motion/".to_string(),
                    switch_topic: "state/switch/".to_string(),
                    contact: vec![],
                    motion: vec![],
                    switches: vec![],
                },
            },
        }
    }

    pub fn deconz_host(mut self, host: &str) -> Self {
        self.config.deconz.host = host.to_string();
        self
    }

    pub fn ws_url(mut self, url: &str) -> Self {
        self.config.deconz.ws_url = Some(url.to_string());
        self
    }

    pub fn contact(mut self, sensor: ContactSensor) -> Self {
        self.config.devices.contact.push(sensor);
        self
    }

    pub fn motion(mut self, sensor: MotionSensor) -> Self {
        self.config.devices.motion.push(sensor);
        self
    }

    pub fn switch(mut self, sensor: SwitchSensor) -> Self {
        self.config.devices.switches.push(sensor);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
