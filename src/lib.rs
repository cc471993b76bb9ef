//! Tello operator console library
//! Drone link, compass heading acquisition and gamepad control for the `tellocon` binary.

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod state;
pub mod utils;
