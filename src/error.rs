//! Error types for the drone link and flight mode handling.
//!
//! The Bluetooth heading flow has no error taxonomy. Every failure there is
//! logged and turned into a disconnected status report, so it uses `anyhow`.

use thiserror::Error;

use crate::core::flying_mode::FlyingMode;

/// Errors raised while talking to the drone over the Tello SDK.
#[derive(Error, Debug)]
pub enum DroneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for a response to '{0}'")]
    Timeout(String),

    #[error("Drone rejected '{command}': {response}")]
    CommandRejected { command: String, response: String },

    #[error("Unexpected response to '{command}': {response}")]
    UnexpectedResponse { command: String, response: String },

    #[error("Drone not connected")]
    NotConnected,

    #[error("Invalid WiFi credentials: {0}")]
    InvalidCredentials(String),

    #[error("Malformed state datagram: {0}")]
    MalformedState(String),
}

/// Errors raised when the operator asks for a flying mode change.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FlyingModeError {
    #[error("{0} mode is not available yet")]
    Unavailable(FlyingMode),

    #[error("Cannot change flying mode while the drone is in the air (height {height_cm} cm)")]
    Airborne { height_cm: i32 },
}

/// Convenience type alias for Results with `DroneError`.
pub type Result<T> = std::result::Result<T, DroneError>;
