//! Core functionality for the Tello console
//! This module contains the compass, drone and flight mode handling

pub mod bluetooth;
pub mod drone;
pub mod flying_mode;
pub mod heading;

// Re-export commonly used types
pub use bluetooth::{BluestTransport, HeadingMonitor};
pub use drone::{DroneController, DroneState, UdpCommandSender};
pub use flying_mode::{FlyingMode, FlyingModeSelector, ModeChange};
pub use heading::{ConnectionStatus, Heading, StatusReporter};
