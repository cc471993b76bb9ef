//! Tello SDK commands
//! This module contains the commands the console sends to the drone

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::drone::constants::RC_LIMIT;
use crate::error::{DroneError, Result};

/// Stick values for the `rc` command, each in `-100..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RcControl {
    pub left_right: i32,
    pub forward_back: i32,
    pub up_down: i32,
    pub yaw: i32,
}

impl RcControl {
    pub fn new(left_right: i32, forward_back: i32, up_down: i32, yaw: i32) -> Self {
        let clamp = |v: i32| v.clamp(-RC_LIMIT, RC_LIMIT);
        Self {
            left_right: clamp(left_right),
            forward_back: clamp(forward_back),
            up_down: clamp(up_down),
            yaw: clamp(yaw),
        }
    }
}

/// Drone commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelloCommand {
    /// Enter SDK mode
    Command,
    TakeOff,
    Land,
    /// Stop all motors immediately
    Emergency,
    StreamOn,
    StreamOff,
    RotateClockwise(u16),
    RotateCounterClockwise(u16),
    /// Continuous stick input, no reply
    Rc(RcControl),
    QueryBattery,
    /// Rename the drone's own access point
    SetWifi { ssid: String, password: String },
    /// Join an existing access point (station mode)
    JoinAccessPoint { ssid: String, password: String },
}

/// How long a command may take before its reply counts as lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTimeout {
    Standard,
    Motion,
}

impl TelloCommand {
    /// Text sent over the wire
    pub fn to_sdk_string(&self) -> String {
        match self {
            Self::Command => "command".to_string(),
            Self::TakeOff => "takeoff".to_string(),
            Self::Land => "land".to_string(),
            Self::Emergency => "emergency".to_string(),
            Self::StreamOn => "streamon".to_string(),
            Self::StreamOff => "streamoff".to_string(),
            Self::RotateClockwise(degrees) => format!("cw {}", degrees),
            Self::RotateCounterClockwise(degrees) => format!("ccw {}", degrees),
            Self::Rc(rc) => format!(
                "rc {} {} {} {}",
                rc.left_right, rc.forward_back, rc.up_down, rc.yaw
            ),
            Self::QueryBattery => "battery?".to_string(),
            Self::SetWifi { ssid, password } => format!("wifi {} {}", ssid, password),
            Self::JoinAccessPoint { ssid, password } => format!("ap {} {}", ssid, password),
        }
    }

    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::Rc(_))
    }

    pub fn response_timeout(&self) -> ResponseTimeout {
        match self {
            Self::TakeOff
            | Self::Land
            | Self::RotateClockwise(_)
            | Self::RotateCounterClockwise(_) => ResponseTimeout::Motion,
            _ => ResponseTimeout::Standard,
        }
    }

    /// Checks a reply. Queries return their value, control commands must answer "ok".
    pub fn check_response(&self, response: &str) -> Result<String> {
        let response = response.trim();
        if response.to_lowercase().starts_with("error") {
            return Err(DroneError::CommandRejected {
                command: self.to_string(),
                response: response.to_string(),
            });
        }
        match self {
            Self::QueryBattery => Ok(response.to_string()),
            // firmware answers these with a reboot notice instead of "ok"
            Self::SetWifi { .. } | Self::JoinAccessPoint { .. } => Ok(response.to_string()),
            _ if response.eq_ignore_ascii_case("ok") => Ok(response.to_string()),
            _ => Err(DroneError::UnexpectedResponse {
                command: self.to_string(),
                response: response.to_string(),
            }),
        }
    }
}

impl fmt::Display for TelloCommand {
    /// Same as the wire text, with passwords masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetWifi { ssid, .. } => write!(f, "wifi {} ****", ssid),
            Self::JoinAccessPoint { ssid, .. } => write!(f, "ap {} ****", ssid),
            other => f.write_str(&other.to_sdk_string()),
        }
    }
}

/// Command sender trait
#[async_trait]
pub trait CommandSender: Send + Sync {
    /// Sends a command. Returns the checked reply, or `None` for commands without one.
    async fn send_command(&self, command: TelloCommand) -> Result<Option<String>>;
}

/// Timeout values resolved from config.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub standard: Duration,
    pub motion: Duration,
}

impl Timeouts {
    pub fn for_command(&self, command: &TelloCommand) -> Duration {
        match command.response_timeout() {
            ResponseTimeout::Standard => self.standard,
            ResponseTimeout::Motion => self.motion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings() {
        assert_eq!(TelloCommand::Command.to_sdk_string(), "command");
        assert_eq!(TelloCommand::RotateClockwise(90).to_sdk_string(), "cw 90");
        assert_eq!(TelloCommand::RotateCounterClockwise(90).to_sdk_string(), "ccw 90");
        assert_eq!(
            TelloCommand::Rc(RcControl::new(10, -20, 30, -40)).to_sdk_string(),
            "rc 10 -20 30 -40"
        );
        assert_eq!(
            TelloCommand::JoinAccessPoint { ssid: "home".into(), password: "secret123".into() }
                .to_sdk_string(),
            "ap home secret123"
        );
    }

    #[test]
    fn rc_values_are_clamped() {
        assert_eq!(RcControl::new(150, -150, 100, -100), RcControl::new(100, -100, 100, -100));
    }

    #[test]
    fn only_rc_is_fire_and_forget() {
        assert!(!TelloCommand::Rc(RcControl::default()).expects_response());
        assert!(TelloCommand::Land.expects_response());
        assert!(TelloCommand::QueryBattery.expects_response());
    }

    #[test]
    fn motion_commands_get_the_long_timeout() {
        let timeouts = Timeouts {
            standard: Duration::from_secs(7),
            motion: Duration::from_secs(20),
        };
        assert_eq!(timeouts.for_command(&TelloCommand::TakeOff), Duration::from_secs(20));
        assert_eq!(timeouts.for_command(&TelloCommand::RotateClockwise(90)), Duration::from_secs(20));
        assert_eq!(timeouts.for_command(&TelloCommand::StreamOn), Duration::from_secs(7));
    }

    #[test]
    fn responses_are_classified() {
        assert_eq!(TelloCommand::TakeOff.check_response("ok\r\n").unwrap(), "ok");
        assert_eq!(TelloCommand::QueryBattery.check_response("87").unwrap(), "87");
        assert!(matches!(
            TelloCommand::Land.check_response("error Not joystick"),
            Err(DroneError::CommandRejected { .. })
        ));
        assert!(matches!(
            TelloCommand::Land.check_response("87"),
            Err(DroneError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn display_masks_passwords() {
        let command = TelloCommand::SetWifi { ssid: "TELLO-X".into(), password: "hunter22".into() };
        assert_eq!(command.to_string(), "wifi TELLO-X ****");
        assert_eq!(TelloCommand::Land.to_string(), "land");
    }
}
