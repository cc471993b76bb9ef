//! Manual / autopilot selection

use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::drone::constants::ON_GROUND_HEIGHT_CM;
use crate::error::FlyingModeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlyingMode {
    #[default]
    Manual,
    /// Shown to the operator but not selectable yet
    Autopilot,
}

impl fmt::Display for FlyingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("Manual"),
            Self::Autopilot => f.write_str("Autopilot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Changed(FlyingMode),
    Unchanged,
}

/// Holds the current mode and guards changes.
#[derive(Debug, Default)]
pub struct FlyingModeSelector {
    current: FlyingMode,
}

impl FlyingModeSelector {
    pub fn current(&self) -> FlyingMode {
        self.current
    }

    /// `height_cm` is the latest reported height, `None` when no state has arrived.
    pub fn select(
        &mut self,
        requested: FlyingMode,
        height_cm: Option<i32>,
    ) -> Result<ModeChange, FlyingModeError> {
        if requested == FlyingMode::Autopilot {
            return Err(FlyingModeError::Unavailable(requested));
        }
        if requested == self.current {
            return Ok(ModeChange::Unchanged);
        }
        if let Some(height_cm) = height_cm.filter(|h| *h >= ON_GROUND_HEIGHT_CM) {
            return Err(FlyingModeError::Airborne { height_cm });
        }
        info!("Flying mode changed: {} -> {}", self.current, requested);
        self.current = requested;
        Ok(ModeChange::Changed(requested))
    }
}
