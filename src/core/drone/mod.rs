//! Tello drone link
//! This module handles the SDK command channel, the state stream and the video stream.

pub mod commands;
mod connection;
pub mod constants;
mod controller;
mod telemetry;
mod video;

#[cfg(test)]
pub(crate) use controller::testing;

pub use commands::{CommandSender, RcControl, TelloCommand, Timeouts};
pub use connection::UdpCommandSender;
pub use controller::DroneController;
pub use telemetry::{DroneState, TelemetryListener};
pub use video::{FrameAssembler, VideoReceiver};
