//! Gamepad input handling

#[cfg(feature = "gamepad")]
pub mod calibration;
pub mod gamepad;
#[cfg(feature = "gamepad")]
pub mod gamepad_source;

pub use gamepad::{GamepadAction, GamepadInputs, GamepadMapper, MappedInput};
#[cfg(feature = "gamepad")]
pub use gamepad_source::GamepadSource;
