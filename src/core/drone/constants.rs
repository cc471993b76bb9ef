//! Tello SDK addresses, ports and timing defaults

use std::net::Ipv4Addr;

/// Drone address on its own access point
pub const TELLO_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 1);

/// UDP port the drone listens on for SDK commands
pub const TELLO_COMMAND_PORT: u16 = 8889;

/// Local UDP port the drone sends state datagrams to
pub const TELLO_STATE_PORT: u16 = 8890;

/// Local UDP port the drone streams H.264 video to
pub const TELLO_VIDEO_PORT: u16 = 11111;

/// Reply timeout for ordinary commands in milliseconds
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 7_000;

/// Reply timeout for takeoff, land and rotations in milliseconds
pub const MOTION_RESPONSE_TIMEOUT_MS: u64 = 20_000;

/// Delay between connecting and requesting the video stream
pub const DEFAULT_VIDEO_START_DELAY_MS: u64 = 1_000;

/// Gamepad sampling / RC send interval
pub const DEFAULT_CONTROL_INTERVAL_MS: u64 = 50;

/// Size of a full video datagram; a shorter one ends a frame
pub const VIDEO_PACKET_SIZE: usize = 1460;

/// Frames above this size are discarded
pub const DEFAULT_MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;

/// Frames buffered between the receiver and the display layer
pub const VIDEO_CHANNEL_CAPACITY: usize = 4;

/// Height below which the drone counts as landed, in cm
pub const ON_GROUND_HEIGHT_CM: i32 = 50;

/// Largest absolute RC stick value
pub const RC_LIMIT: i32 = 100;
