use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigFile;

/// Logical buttons, in calibration order.
pub const LOGICAL_BUTTONS: [&str; 11] = [
    "cross", "circle", "square", "triangle", "l1", "r1", "share", "options", "ps", "l3", "r3",
];

/// Human readable prompt for a logical button, covering both PlayStation and Xbox layouts.
pub fn display_name(logical: &str) -> String {
    let name = match logical {
        "cross" => "A (or Cross)",
        "circle" => "B (or Circle)",
        "square" => "X (or Square)",
        "triangle" => "Y (or Triangle)",
        "l1" => "LB (or L1)",
        "r1" => "RB (or R1)",
        "share" => "View (or Share)",
        "options" => "Menu (or Options)",
        "ps" => "Xbox/Home (or PS)",
        "l3" => "Left Stick Click",
        "r3" => "Right Stick Click",
        other => return other.to_uppercase(),
    };
    name.to_string()
}

/// Maps logical button names to gilrs button names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GamepadConfig {
    pub buttons: BTreeMap<String, String>,
    /// Trigger value above which l2/r2 count as pressed.
    pub trigger_threshold: f32,
}

impl Default for GamepadConfig {
    fn default() -> Self {
        let pairs = [
            ("cross", "South"),
            ("circle", "East"),
            ("square", "West"),
            ("triangle", "North"),
            ("l1", "LeftTrigger"),
            ("r1", "RightTrigger"),
            ("share", "Select"),
            ("options", "Start"),
            ("ps", "Mode"),
            ("l3", "LeftThumb"),
            ("r3", "RightThumb"),
        ];
        Self {
            buttons: pairs
                .iter()
                .map(|(logical, physical)| (logical.to_string(), physical.to_string()))
                .collect(),
            trigger_threshold: 0.5,
        }
    }
}

impl ConfigFile for GamepadConfig {
    const FILE_NAME: &'static str = "gamepad_config.json";
}
