//! Gamepad to drone command mapping

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::Serialize;

use crate::config::gamepad_config::GamepadConfig;
use crate::core::drone::constants::RC_LIMIT;
use crate::core::drone::RcControl;

/// One sample of the gamepad. Sticks are in `-1.0..=1.0` with up positive, triggers in `0.0..=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GamepadInputs {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub l2: f32,
    pub r2: f32,
    /// Logical button name to pressed flag
    pub buttons: BTreeMap<String, bool>,
}

impl GamepadInputs {
    pub fn is_pressed(&self, logical: &str) -> bool {
        self.buttons.get(logical).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadAction {
    TakeOff,
    Land,
    RotateLeft90,
    RotateRight90,
}

/// Result of one mapping step
#[derive(Debug, Clone, PartialEq)]
pub struct MappedInput {
    pub rc: RcControl,
    pub actions: Vec<GamepadAction>,
}

// (control, action) in firing order
const ACTION_BINDINGS: [(&str, GamepadAction); 4] = [
    ("r1", GamepadAction::TakeOff),
    ("l1", GamepadAction::Land),
    ("r2", GamepadAction::RotateRight90),
    ("l2", GamepadAction::RotateLeft90),
];

fn stick(value: f32) -> i32 {
    // `as` truncates toward zero
    ((value * RC_LIMIT as f32) as i32).clamp(-RC_LIMIT, RC_LIMIT)
}

/// Turns gamepad samples into RC values and rising-edge actions.
pub struct GamepadMapper {
    trigger_threshold: f32,
    invert_forward_back: bool,
    held: BTreeSet<&'static str>,
}

impl GamepadMapper {
    pub fn new(config: &GamepadConfig, invert_forward_back: bool) -> Self {
        Self {
            trigger_threshold: config.trigger_threshold,
            invert_forward_back,
            held: BTreeSet::new(),
        }
    }

    fn control_pressed(&self, inputs: &GamepadInputs, control: &str) -> bool {
        match control {
            "l2" => inputs.l2 > self.trigger_threshold,
            "r2" => inputs.r2 > self.trigger_threshold,
            button => inputs.is_pressed(button),
        }
    }

    pub fn rc_control(&self, inputs: &GamepadInputs) -> RcControl {
        let forward_back = if self.invert_forward_back {
            -stick(inputs.right_y)
        } else {
            stick(inputs.right_y)
        };
        RcControl::new(
            stick(inputs.right_x),
            forward_back,
            stick(inputs.left_y),
            stick(inputs.left_x),
        )
    }

    pub fn update(&mut self, inputs: &GamepadInputs) -> MappedInput {
        let mut actions = Vec::new();
        for (control, action) in ACTION_BINDINGS {
            let pressed = self.control_pressed(inputs, control);
            let was_held = self.held.contains(control);
            if pressed && !was_held {
                debug!("Gamepad action {:?}", action);
                actions.push(action);
                self.held.insert(control);
            } else if !pressed && was_held {
                self.held.remove(control);
            }
        }
        MappedInput {
            rc: self.rc_control(inputs),
            actions,
        }
    }

    /// Forgets held buttons, for when the gamepad goes away.
    pub fn reset(&mut self) {
        self.held.clear();
    }
}
