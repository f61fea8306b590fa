use crate::domain::device::Device;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// REST client for the gateway. The API key is part of the URL path, so
/// the base URL already carries it.
// API: https://dresden-elektronik.github.io/deconz-rest-doc/
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    host: String,
    base: String,
}

impl GatewayClient {
    pub fn new(host: &str, api_key: &str) -> Result<GatewayClient, ClientError> {
        let http = Client::builder().build()?;

        Ok(GatewayClient {
            http,
            host: host.to_string(),
            base: format!("http://{host}/api/{api_key}"),
        })
    }

    /// Fetches both inventory collections and merges them into a single
    /// map keyed by unique hardware id.
    pub async fn devices(&self) -> Result<HashMap<String, Device>, ClientError> {
        let mut devices = HashMap::new();

        for (resource, collection) in [("sensors", self.sensors().await?), ("lights", self.lights().await?)] {
            for (path_id, entry) in collection {
                if entry.unique_id.is_empty() {
                    debug!("Skipping {} entry {} ('{}') without a unique id", resource, path_id, entry.name);
                    continue;
                }

                debug!("{}: '{}' with unique id '{}'", resource, entry.name, entry.unique_id);
                devices.insert(
                    entry.unique_id.clone(),
                    Device {
                        unique_id: entry.unique_id,
                        r#type: entry.r#type,
                        name: entry.name,
                        path_id: path_id.to_string(),
                    },
                );
            }
        }

        Ok(devices)
    }

    pub async fn sensors(&self) -> Result<HashMap<u32, InventoryEntry>, ClientError> {
        self.collection("sensors").await
    }

    pub async fn lights(&self) -> Result<HashMap<u32, InventoryEntry>, ClientError> {
        self.collection("lights").await
    }

    async fn collection(&self, resource: &str) -> Result<HashMap<u32, InventoryEntry>, ClientError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base, resource))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<HashMap<u32, InventoryEntry>>().await?)
    }

    /// Discovers the event WebSocket address through the gateway's config
    /// resource. The WebSocket listens on its own port next to the REST
    /// API.
    pub async fn websocket_url(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .get(format!("{}/config", self.base))
            .send()
            .await?
            .error_for_status()?;

        let config = response.json::<GatewayConfig>().await?;
        let host = self.host.split(':').next().unwrap_or(self.host.as_str());

        Ok(format!("ws://{}:{}", host, config.websocket_port))
    }
}

/// One entry of an inventory collection. The collections carry a lot more
/// (state, config, manufacturer data); only the fields needed to resolve
/// events are kept.
#[derive(Debug, Deserialize)]
pub struct InventoryEntry {
    pub name: String,
    pub r#type: String,
    #[serde(rename = "uniqueid", default)]
    pub unique_id: String,
}

#[derive(Debug, Deserialize)]
struct GatewayConfig {
    #[serde(rename = "websocketport")]
    websocket_port: u16,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}
