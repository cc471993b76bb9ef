use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    DEFAULT_DEVICE_NAME_PATTERN, DEFAULT_IDLE_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_SCAN_DURATION_MS, DEFAULT_SHUTDOWN_GRACE_MS,
    UUID_HEADING_CHAR, UUID_HEADING_SERVICE,
};

/// Settings for the Bluetooth heading peripheral.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeadingConfig {
    /// Case-insensitive substring matched against advertised device names.
    pub device_name_pattern: String,
    /// Service advertised by the peripheral firmware.
    pub service_uuid: Uuid,
    /// Characteristic tried first when subscribing.
    pub characteristic_uuid: Uuid,
    /// How long a single scan listens for advertisements.
    pub scan_timeout_ms: u64,
    /// Pause between scans when nothing matched, and between link checks while subscribed.
    pub idle_interval_ms: u64,
    /// Pause after a connection error or a lost connection.
    pub retry_delay_ms: u64,
    /// Read interval when the characteristic can only be polled.
    pub poll_interval_ms: u64,
    /// How long `stop` waits for the worker to disconnect.
    pub shutdown_grace_ms: u64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            device_name_pattern: DEFAULT_DEVICE_NAME_PATTERN.to_string(),
            service_uuid: UUID_HEADING_SERVICE,
            characteristic_uuid: UUID_HEADING_CHAR,
            scan_timeout_ms: DEFAULT_SCAN_DURATION_MS,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl HeadingConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
