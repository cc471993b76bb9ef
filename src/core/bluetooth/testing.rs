//! Scripted transport used by the connector and monitor tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::heading_config::HeadingConfig;
use crate::core::bluetooth::constants::UUID_HEADING_SERVICE;
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::bluetooth::types::{CharacteristicInfo, DiscoveredPeripheral, NotificationReceiver};

#[derive(Default)]
pub struct FakeState {
    pub devices: Vec<DiscoveredPeripheral<String>>,
    pub characteristics: Vec<CharacteristicInfo<Uuid>>,
    pub failing_subscriptions: Vec<Uuid>,
    pub read_payload: Vec<u8>,
    pub fail_reads: bool,
    pub fail_scan: bool,
    pub connected: bool,
    /// Call log, e.g. "scan", "connect:id", "subscribe:uuid"
    pub calls: Vec<String>,
    pub notifiers: Vec<mpsc::Sender<Result<Vec<u8>>>>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn with_device(name: &str) -> Self {
        let transport = Self::default();
        transport.state.lock().unwrap().devices.push(DiscoveredPeripheral::new(
            format!("id-{name}"),
            Some(name.to_string()),
            Some(-50),
            format!("id-{name}"),
        ));
        transport
    }

    /// Adds a characteristic to the compass service.
    pub fn add_characteristic(&self, uuid: Uuid, notify: bool, read: bool) {
        self.add_characteristic_in(UUID_HEADING_SERVICE, uuid, notify, read);
    }

    pub fn add_characteristic_in(&self, service: Uuid, uuid: Uuid, notify: bool, read: bool) {
        self.state.lock().unwrap().characteristics.push(CharacteristicInfo {
            uuid,
            service,
            notify,
            read,
            handle: uuid,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Pushes a payload to every live subscription, waiting until one exists.
    pub async fn notify(&self, payload: &[u8]) {
        for _ in 0..200 {
            let senders = self.state.lock().unwrap().notifiers.clone();
            if !senders.is_empty() {
                for sender in senders {
                    let _ = sender.send(Ok(payload.to_vec())).await;
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no subscription appeared");
    }

    /// Ends every live subscription, as a dropped link would.
    pub fn drop_subscriptions(&self) {
        self.state.lock().unwrap().notifiers.clear();
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl PeripheralTransport for FakeTransport {
    type Peripheral = String;
    type Characteristic = Uuid;

    async fn scan(&self, _timeout: Duration) -> Result<Vec<DiscoveredPeripheral<String>>> {
        self.record("scan".to_string());
        let state = self.state.lock().unwrap();
        if state.fail_scan {
            return Err(anyhow!("adapter powered off"));
        }
        Ok(state.devices.clone())
    }

    async fn connect(&self, peripheral: &String) -> Result<()> {
        self.record(format!("connect:{peripheral}"));
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    async fn disconnect(&self, peripheral: &String) -> Result<()> {
        self.record(format!("disconnect:{peripheral}"));
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.notifiers.clear();
        Ok(())
    }

    async fn is_connected(&self, _peripheral: &String) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn characteristics(&self, _peripheral: &String) -> Result<Vec<CharacteristicInfo<Uuid>>> {
        self.record("characteristics".to_string());
        Ok(self.state.lock().unwrap().characteristics.clone())
    }

    async fn subscribe(&self, characteristic: &Uuid) -> Result<NotificationReceiver> {
        self.record(format!("subscribe:{characteristic}"));
        let mut state = self.state.lock().unwrap();
        if state.failing_subscriptions.contains(characteristic) {
            return Err(anyhow!("notify not permitted"));
        }
        let (tx, rx) = mpsc::channel(8);
        state.notifiers.push(tx);
        Ok(rx)
    }

    async fn read(&self, characteristic: &Uuid) -> Result<Vec<u8>> {
        self.record(format!("read:{characteristic}"));
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(anyhow!("read failed"));
        }
        Ok(state.read_payload.clone())
    }
}

/// Short timings so the tests run quickly.
pub fn fast_config() -> HeadingConfig {
    HeadingConfig {
        scan_timeout_ms: 1,
        idle_interval_ms: 10,
        retry_delay_ms: 5_000,
        poll_interval_ms: 5,
        shutdown_grace_ms: 500,
        ..HeadingConfig::default()
    }
}
