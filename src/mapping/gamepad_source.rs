//! Physical gamepad input via gilrs

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use gilrs::{Axis, Button, EventType, Gamepad, Gilrs};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::gamepad_config::GamepadConfig;
use crate::mapping::gamepad::GamepadInputs;

/// Parses a gilrs button name as stored in the mapping file.
pub fn button_from_name(name: &str) -> Option<Button> {
    let button = match name {
        "South" => Button::South,
        "East" => Button::East,
        "North" => Button::North,
        "West" => Button::West,
        "C" => Button::C,
        "Z" => Button::Z,
        "LeftTrigger" => Button::LeftTrigger,
        "LeftTrigger2" => Button::LeftTrigger2,
        "RightTrigger" => Button::RightTrigger,
        "RightTrigger2" => Button::RightTrigger2,
        "Select" => Button::Select,
        "Start" => Button::Start,
        "Mode" => Button::Mode,
        "LeftThumb" => Button::LeftThumb,
        "RightThumb" => Button::RightThumb,
        "DPadUp" => Button::DPadUp,
        "DPadDown" => Button::DPadDown,
        "DPadLeft" => Button::DPadLeft,
        "DPadRight" => Button::DPadRight,
        _ => return None,
    };
    Some(button)
}

pub fn button_name(button: Button) -> String {
    format!("{:?}", button)
}

pub(crate) fn open_gilrs() -> Result<Gilrs> {
    Gilrs::new().map_err(|e| anyhow!("Failed to initialise gamepad support: {e}"))
}

fn trigger_value(gamepad: &Gamepad<'_>, button: Button) -> f32 {
    gamepad
        .button_data(button)
        .map(|data| data.value())
        .unwrap_or(0.0)
}

fn snapshot(gamepad: &Gamepad<'_>, buttons: &[(String, Button)]) -> GamepadInputs {
    GamepadInputs {
        left_x: gamepad.value(Axis::LeftStickX),
        left_y: gamepad.value(Axis::LeftStickY),
        right_x: gamepad.value(Axis::RightStickX),
        right_y: gamepad.value(Axis::RightStickY),
        l2: trigger_value(gamepad, Button::LeftTrigger2),
        r2: trigger_value(gamepad, Button::RightTrigger2),
        buttons: buttons
            .iter()
            .map(|(logical, button)| (logical.clone(), gamepad.is_pressed(*button)))
            .collect(),
    }
}

fn resolve_buttons(config: &GamepadConfig) -> Vec<(String, Button)> {
    config
        .buttons
        .iter()
        .filter_map(|(logical, physical)| match button_from_name(physical) {
            Some(button) => Some((logical.clone(), button)),
            None => {
                warn!("Unknown gamepad button '{}' mapped to '{}', ignoring it", physical, logical);
                None
            }
        })
        .collect()
}

/// Samples the first connected gamepad on a dedicated thread.
pub struct GamepadSource {
    inputs_rx: watch::Receiver<Option<GamepadInputs>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl GamepadSource {
    /// Starts the sampling thread. `None` is published while no gamepad is connected.
    pub fn start(config: &GamepadConfig, interval: Duration, cancel: CancellationToken) -> Result<Self> {
        let (inputs_tx, inputs_rx) = watch::channel(None);
        let buttons = resolve_buttons(config);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        // Gilrs is not Send, so it lives and dies on this thread
        let thread_handle = thread::spawn(move || {
            let mut gilrs = match open_gilrs() {
                Ok(gilrs) => {
                    let _ = ready_tx.send(Ok(()));
                    gilrs
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            info!("Gamepad thread started.");

            while !cancel.is_cancelled() {
                while let Some(event) = gilrs.next_event() {
                    match event.event {
                        EventType::Connected => {
                            info!("Gamepad connected: {}", gilrs.gamepad(event.id).name())
                        }
                        EventType::Disconnected => info!("Gamepad disconnected"),
                        _ => {}
                    }
                }

                let inputs = gilrs
                    .gamepads()
                    .find(|(_, gamepad)| gamepad.is_connected())
                    .map(|(_, gamepad)| snapshot(&gamepad, &buttons));
                inputs_tx.send_replace(inputs);

                thread::sleep(interval);
            }
            debug!("Gamepad thread stopped");
        });

        ready_rx
            .recv()
            .map_err(|_| anyhow!("Gamepad thread exited during startup"))??;

        Ok(Self {
            inputs_rx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<GamepadInputs>> {
        self.inputs_rx.clone()
    }

    /// Waits for the thread after its token has been cancelled.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Gamepad thread panicked");
            }
        }
    }
}
