use std::time::Duration;

use anyhow::Result;
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};

use crate::core::bluetooth::types::DiscoveredPeripheral;

#[derive(Clone)]
pub struct BluetoothScanner {
    adapter: Adapter,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Collects advertising devices for `timeout`.
    /// Devices already connected to the host are listed first since they no longer advertise.
    pub async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredPeripheral<Device>>> {
        let mut found: Vec<DiscoveredPeripheral<Device>> = Vec::new();

        debug!("Checking for connected devices");
        match self.adapter.connected_devices().await {
            Ok(connected_devices) => {
                for device in connected_devices {
                    let name = device.name().ok();
                    Self::remember(&mut found, device, name, None);
                }
            }
            Err(e) => warn!("Failed to list connected devices: {}", e),
        }

        info!("Starting bluetooth scan ({} ms)", timeout.as_millis());
        let mut scan_stream = self.adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let device = discovered_device.device;
                            let name = discovered_device
                                .adv_data
                                .local_name
                                .or_else(|| device.name().ok());
                            debug!("Found device - Device: {:?}, Name: {:?}, RSSI: {:?}", device, name, discovered_device.rssi);
                            Self::remember(&mut found, device, name, discovered_device.rssi);
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    break;
                }
            }
        }

        info!("Scan complete, {} device(s) seen", found.len());
        Ok(found)
    }

    /// Records a device once; later advertisements only fill in a missing name or RSSI.
    fn remember(
        found: &mut Vec<DiscoveredPeripheral<Device>>,
        device: Device,
        name: Option<String>,
        rssi: Option<i16>,
    ) {
        let id = device.id().to_string();
        if let Some(existing) = found.iter_mut().find(|d| d.id == id) {
            if existing.name.is_none() {
                existing.name = name;
            }
            if rssi.is_some() {
                existing.rssi = rssi;
            }
            return;
        }
        found.push(DiscoveredPeripheral::new(id, name, rssi, device));
    }
}
