use crate::deconz::client::{ClientError, GatewayClient};
use crate::deconz::event::Resource;
use crate::domain::device::Device;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Lazily-populated cache of the gateway's device inventory, keyed by
/// unique hardware id.
///
/// The inventory is fetched on the first lookup and then never again for
/// the lifetime of the process: a device paired after population will not
/// resolve. `refresh_on_miss` softens that trade-off by refetching once
/// when a lookup misses; it is off by default to keep the steady state
/// cheap. `force_refresh` exists for callers that know the topology
/// changed.
pub struct DeviceDirectory {
    client: GatewayClient,
    refresh_on_miss: bool,
    cache: RwLock<Option<HashMap<String, Device>>>,
}

impl DeviceDirectory {
    pub fn new(client: GatewayClient, refresh_on_miss: bool) -> DeviceDirectory {
        DeviceDirectory {
            client,
            refresh_on_miss,
            cache: RwLock::new(None),
        }
    }

    pub async fn lookup_device(&self, id: &str) -> Result<Device, DirectoryError> {
        self.ensure_populated().await?;

        if let Some(device) = self.get(id).await {
            return Ok(device);
        }

        if self.refresh_on_miss {
            warn!("Device '{}' missed the directory, refreshing the inventory once", id);
            self.force_refresh().await?;

            if let Some(device) = self.get(id).await {
                return Ok(device);
            }
        }

        Err(DirectoryError::DeviceNotFound(id.to_string()))
    }

    pub async fn lookup_type(&self, id: &str) -> Result<String, DirectoryError> {
        self.lookup_device(id).await.map(|device| device.r#type)
    }

    pub fn supports_resource(&self, resource: Resource) -> bool {
        resource.is_supported()
    }

    /// Drops the cached inventory and refetches it. Not called anywhere in
    /// the pipeline; the directory deliberately stays stale (see the type
    /// docs).
    pub async fn force_refresh(&self) -> Result<(), DirectoryError> {
        let devices = self.client.devices().await?;
        info!("Device directory refreshed, found {} device(s)", devices.len());

        *self.cache.write().await = Some(devices);
        Ok(())
    }

    // Population happens at most once: concurrent first lookups serialize
    // on the write half, and the later ones find the cache filled. A fetch
    // failure leaves the cache empty so the next lookup retries.
    async fn ensure_populated(&self) -> Result<(), DirectoryError> {
        if self.cache.read().await.is_some() {
            return Ok(());
        }

        let mut guard = self.cache.write().await;
        if guard.is_none() {
            let devices = self.client.devices().await?;
            info!("Device directory populated, found {} device(s)", devices.len());
            *guard = Some(devices);
        }

        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Device> {
        self.cache.read().await.as_ref().and_then(|devices| devices.get(id).cloned())
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("no device with id '{0}'")]
    DeviceNotFound(String),
    #[error("unable to fetch the device inventory: {0}")]
    Fetch(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn directory(server: &mockito::Server, refresh_on_miss: bool) -> DeviceDirectory {
        let host = server.url().trim_start_matches("http://").to_string();
        let client = GatewayClient::new(&host, "key").expect("could not build a client");
        DeviceDirectory::new(client, refresh_on_miss)
    }

    async fn inventory_mocks(server: &mut mockito::Server, hits: usize) -> (mockito::Mock, mockito::Mock) {
        let sensors = server
            .mock("GET", "/api/key/sensors")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(include_str!("../../tests/resources/deconz_sensors_response.json"))
            .expect(hits)
            .create_async()
            .await;
        let lights = server
            .mock("GET", "/api/key/lights")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(include_str!("../../tests/resources/deconz_lights_response.json"))
            .expect(hits)
            .create_async()
            .await;
        (sensors, lights)
    }

    #[tokio::test]
    async fn lookups_populate_the_directory_exactly_once() -> Result<(), DirectoryError> {
        let mut server = mockito::Server::new_async().await;
        let (sensors, lights) = inventory_mocks(&mut server, 1).await;
        let directory = directory(&server, false);

        let (first, second) = tokio::join!(
            directory.lookup_type("00:15:8d:00:01:aa:bb:cc-01-0500"),
            directory.lookup_type("00:15:8d:00:02:dd:ee:ff-01-0006")
        );
        let third = directory.lookup_device("00:17:88:01:02:03:04:05-0b").await?;

        assert_eq!(first?, "ZHAFire");
        assert_eq!(second?, "ZHASwitch");
        assert_eq!(third.name, "Living room ceiling");
        sensors.assert();
        lights.assert();

        Ok(())
    }

    #[tokio::test]
    async fn a_miss_returns_device_not_found_without_refetching() {
        let mut server = mockito::Server::new_async().await;
        let (sensors, lights) = inventory_mocks(&mut server, 1).await;
        let directory = directory(&server, false);

        let result = directory.lookup_type("de:ad:be:ef:00:00:00:00-01").await;

        assert!(matches!(result, Err(DirectoryError::DeviceNotFound(id)) if id == "de:ad:be:ef:00:00:00:00-01"));
        sensors.assert();
        lights.assert();
    }

    #[tokio::test]
    async fn a_miss_refetches_once_when_the_policy_is_enabled() {
        let mut server = mockito::Server::new_async().await;
        let (sensors, lights) = inventory_mocks(&mut server, 2).await;
        let directory = directory(&server, true);

        let result = directory.lookup_type("de:ad:be:ef:00:00:00:00-01").await;

        assert!(matches!(result, Err(DirectoryError::DeviceNotFound(_))));
        sensors.assert();
        lights.assert();
    }

    #[tokio::test]
    async fn a_failed_fetch_leaves_the_directory_unpopulated() -> Result<(), DirectoryError> {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/api/key/sensors")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let directory = directory(&server, false);

        let result = directory.lookup_type("00:15:8d:00:01:aa:bb:cc-01-0500").await;
        assert!(matches!(result, Err(DirectoryError::Fetch(_))));
        failing.assert();

        // The next lookup retries the fetch and succeeds
        inventory_mocks(&mut server, 1).await;
        let r#type = directory.lookup_type("00:15:8d:00:01:aa:bb:cc-01-0500").await?;
        assert_eq!(r#type, "ZHAFire");

        Ok(())
    }

    #[tokio::test]
    async fn force_refresh_picks_up_newly_paired_devices() -> Result<(), DirectoryError> {
        let mut server = mockito::Server::new_async().await;
        let empty_sensors = server
            .mock("GET", "/api/key/sensors")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let empty_lights = server
            .mock("GET", "/api/key/lights")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let directory = directory(&server, false);

        let miss = directory.lookup_type("00:15:8d:00:01:aa:bb:cc-01-0500").await;
        assert!(matches!(miss, Err(DirectoryError::DeviceNotFound(_))));
        empty_sensors.assert();
        empty_lights.assert();

        inventory_mocks(&mut server, 1).await;
        directory.force_refresh().await?;

        let r#type = directory.lookup_type("00:15:8d:00:01:aa:bb:cc-01-0500").await?;
        assert_eq!(r#type, "ZHAFire");

        Ok(())
    }
}
