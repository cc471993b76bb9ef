//! Bluetooth functionality for the compass peripheral
//! This module handles scanning, connecting, subscribing and polling,
//! and forwards decoded headings to the status reporter.

mod connection;
pub mod connector;
pub mod constants;
mod monitor;
mod notification;
mod scanner;
#[cfg(test)]
mod testing;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use connector::PeripheralConnector;
pub use constants::*; // Re-export all constants
pub use monitor::HeadingMonitor;
pub use notification::NotificationHandler;
pub use transport::{BluestTransport, PeripheralTransport};
pub use types::{
    choose_characteristic, select_peripheral, CharacteristicInfo, DataPath, DiscoveredPeripheral,
    NotificationReceiver, PeripheralSession,
};
