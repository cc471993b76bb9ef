//! Bluetooth connection handling for the heading peripheral
//! This module connects, discovers characteristics and manages subscriptions via bluest

use anyhow::{anyhow, Result};
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::core::bluetooth::constants::NOTIFICATION_CHANNEL_CAPACITY;
use crate::core::bluetooth::types::{CharacteristicInfo, NotificationReceiver};

/// Connection manager for the peripheral
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    pub async fn connect(&self, device: &Device) -> Result<()> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device.id(), name);

        if device.is_connected().await {
            info!("Device already connected.");
            return Ok(());
        }
        info!("Initiating connection to {}...", device.id());
        self.adapter.connect_device(device).await?;
        info!("Connection successful");
        Ok(())
    }

    pub async fn disconnect(&self, device: &Device) -> Result<()> {
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter.disconnect_device(device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }

    /// Discovers every service and lists their characteristics with notify/read support.
    pub async fn discover_characteristics(&self, device: &Device) -> Result<Vec<CharacteristicInfo<Characteristic>>> {
        info!("Discovering services...");
        let services = device.discover_services().await?;
        let mut found = Vec::new();

        for service in services {
            debug!("Available service: {}", service.uuid());
            for characteristic in service.discover_characteristics().await? {
                let uuid = characteristic.uuid();
                let properties = match characteristic.properties().await {
                    Ok(properties) => properties,
                    Err(e) => {
                        warn!("Could not read properties of {}: {}", uuid, e);
                        continue;
                    }
                };
                debug!("Characteristic {} in service {}: {:?}", uuid, service.uuid(), properties);
                found.push(CharacteristicInfo {
                    uuid,
                    service: service.uuid(),
                    notify: properties.notify || properties.indicate,
                    read: properties.read,
                    handle: characteristic,
                });
            }
        }

        Ok(found)
    }

    /// Subscribes to `characteristic` on a forwarding task.
    /// The task unsubscribes as soon as the returned receiver is dropped.
    pub async fn subscribe(&self, characteristic: &Characteristic) -> Result<NotificationReceiver> {
        info!("Subscribing to notifications on {}...", characteristic.uuid());
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let characteristic = characteristic.clone();

        tokio::spawn(async move {
            let mut notification_stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };

            loop {
                tokio::select! {
                    item = notification_stream.next() => {
                        match item {
                            Some(result) => {
                                if tx.send(result.map_err(anyhow::Error::from)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
            info!("Notification stream ended for {}", characteristic.uuid());
        });

        ready_rx
            .await
            .map_err(|_| anyhow!("Notification task exited before subscribing"))??;
        Ok(rx)
    }
}
