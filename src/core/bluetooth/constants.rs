//! Constants for the Bluetooth heading peripheral
//! UUIDs and timing defaults used by the connector.

use uuid::Uuid;

/// Name fragment advertised by the ESP32 compass firmware
pub const DEFAULT_DEVICE_NAME_PATTERN: &str = "ESP32";

/// Vendor service exposed by the ESP32 firmware
pub const UUID_HEADING_SERVICE: Uuid = Uuid::from_u128(0x0000ff00_0000_1000_8000_00805f9b34fb);

/// Characteristic carrying heading text or a little-endian u16
pub const UUID_HEADING_CHAR: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);

/// Scan duration in milliseconds
pub const DEFAULT_SCAN_DURATION_MS: u64 = 5000;

/// Pause between scans, and between link checks while subscribed
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1000;

/// Delay before reconnecting after an error
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Poll interval when notifications are unavailable
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Grace period granted to the worker on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

/// Buffered notifications between the BLE backend and the connector
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 32;
