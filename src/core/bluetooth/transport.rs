//! The seam between the heading connector and the Bluetooth backend.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use log::info;
use uuid::Uuid;

use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::types::{CharacteristicInfo, DiscoveredPeripheral, NotificationReceiver};

/// Operations the connector needs from a BLE central.
#[async_trait]
pub trait PeripheralTransport: Send + Sync {
    type Peripheral: Clone + Send + Sync + 'static;
    type Characteristic: Clone + Send + Sync + 'static;

    /// Lists devices seen within `timeout`, including ones already connected to the host.
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredPeripheral<Self::Peripheral>>>;

    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<()>;

    async fn disconnect(&self, peripheral: &Self::Peripheral) -> Result<()>;

    async fn is_connected(&self, peripheral: &Self::Peripheral) -> bool;

    /// Every characteristic of every service on the peripheral.
    async fn characteristics(
        &self,
        peripheral: &Self::Peripheral,
    ) -> Result<Vec<CharacteristicInfo<Self::Characteristic>>>;

    /// Finds a characteristic by UUID, preferring one inside `service` over other services.
    async fn find_characteristic(
        &self,
        peripheral: &Self::Peripheral,
        service: Uuid,
        uuid: Uuid,
    ) -> Result<Option<CharacteristicInfo<Self::Characteristic>>> {
        let (in_service, elsewhere): (Vec<_>, Vec<_>) = self
            .characteristics(peripheral)
            .await?
            .into_iter()
            .filter(|c| c.uuid == uuid)
            .partition(|c| c.service == service);
        Ok(in_service.into_iter().next().or_else(|| elsewhere.into_iter().next()))
    }

    /// Enables notifications and returns the payload stream.
    async fn subscribe(&self, characteristic: &Self::Characteristic) -> Result<NotificationReceiver>;

    async fn read(&self, characteristic: &Self::Characteristic) -> Result<Vec<u8>>;
}

/// Production transport backed by the host's default `bluest` adapter.
#[derive(Clone)]
pub struct BluestTransport {
    scanner: BluetoothScanner,
    connection_manager: ConnectionManager,
}

impl BluestTransport {
    /// Opens the default adapter and waits until it is powered on.
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            scanner: BluetoothScanner::new(adapter.clone()),
            connection_manager: ConnectionManager::new(adapter),
        })
    }
}

#[async_trait]
impl PeripheralTransport for BluestTransport {
    type Peripheral = Device;
    type Characteristic = Characteristic;

    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredPeripheral<Device>>> {
        self.scanner.scan(timeout).await
    }

    async fn connect(&self, peripheral: &Device) -> Result<()> {
        self.connection_manager.connect(peripheral).await
    }

    async fn disconnect(&self, peripheral: &Device) -> Result<()> {
        self.connection_manager.disconnect(peripheral).await
    }

    async fn is_connected(&self, peripheral: &Device) -> bool {
        peripheral.is_connected().await
    }

    async fn characteristics(&self, peripheral: &Device) -> Result<Vec<CharacteristicInfo<Characteristic>>> {
        self.connection_manager.discover_characteristics(peripheral).await
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<NotificationReceiver> {
        self.connection_manager.subscribe(characteristic).await
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        Ok(characteristic.read().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{UUID_HEADING_CHAR, UUID_HEADING_SERVICE};
    use crate::core::bluetooth::testing::FakeTransport;

    #[tokio::test]
    async fn lookup_prefers_the_configured_service() {
        let battery_service = Uuid::from_u128(0x180F);
        let transport = FakeTransport::with_device("ESP32");
        transport.add_characteristic_in(battery_service, UUID_HEADING_CHAR, false, true);
        transport.add_characteristic(UUID_HEADING_CHAR, true, false);
        let device = "id-ESP32".to_string();

        let found = transport
            .find_characteristic(&device, UUID_HEADING_SERVICE, UUID_HEADING_CHAR)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.service, UUID_HEADING_SERVICE);
        assert!(found.notify);

        let elsewhere = transport
            .find_characteristic(&device, Uuid::from_u128(0xFFFF), UUID_HEADING_CHAR)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(elsewhere.service, battery_service);

        assert!(transport
            .find_characteristic(&device, UUID_HEADING_SERVICE, Uuid::from_u128(1))
            .await
            .unwrap()
            .is_none());
    }
}
