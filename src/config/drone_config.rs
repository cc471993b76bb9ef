use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::drone::constants::{
    DEFAULT_CONTROL_INTERVAL_MS, DEFAULT_MAX_FRAME_BYTES, DEFAULT_RESPONSE_TIMEOUT_MS,
    DEFAULT_VIDEO_START_DELAY_MS, MOTION_RESPONSE_TIMEOUT_MS, TELLO_COMMAND_PORT, TELLO_IP,
    TELLO_STATE_PORT, TELLO_VIDEO_PORT,
};

/// Settings for the WiFi link to the drone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DroneConfig {
    /// Drone address on its own access point.
    pub address: IpAddr,
    pub command_port: u16,
    pub state_port: u16,
    pub video_port: u16,
    /// Reply timeout for most commands.
    pub response_timeout_ms: u64,
    /// Reply timeout for takeoff, land and rotations.
    pub motion_timeout_ms: u64,
    /// Delay between a successful connect and `streamon`.
    pub video_start_delay_ms: u64,
    /// Gamepad sampling and RC send interval.
    pub control_interval_ms: u64,
    /// Frames larger than this are discarded.
    pub max_frame_bytes: usize,
    /// Flip the sign of the forward/backward stick.
    pub invert_forward_back: bool,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(TELLO_IP),
            command_port: TELLO_COMMAND_PORT,
            state_port: TELLO_STATE_PORT,
            video_port: TELLO_VIDEO_PORT,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            motion_timeout_ms: MOTION_RESPONSE_TIMEOUT_MS,
            video_start_delay_ms: DEFAULT_VIDEO_START_DELAY_MS,
            control_interval_ms: DEFAULT_CONTROL_INTERVAL_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            invert_forward_back: false,
        }
    }
}

impl DroneConfig {
    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.command_port)
    }

    pub fn state_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.state_port)
    }

    pub fn video_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.video_port)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_timeout_ms)
    }

    pub fn video_start_delay(&self) -> Duration {
        Duration::from_millis(self.video_start_delay_ms)
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_addresses_follow_the_sdk() {
        let config = DroneConfig::default();
        assert_eq!(config.command_addr().to_string(), "192.168.10.1:8889");
        assert_eq!(config.state_bind_addr().port(), 8890);
        assert_eq!(config.video_bind_addr().port(), 11111);
        assert_eq!(config.control_interval(), Duration::from_millis(50));
    }
}
