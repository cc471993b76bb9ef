//! Interactive button calibration

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gilrs::{EventType, Gilrs};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::config::gamepad_config::{display_name, GamepadConfig, LOGICAL_BUTTONS};
use crate::config::ConfigFile;
use crate::mapping::gamepad_source::{button_name, open_gilrs};

const SETTLE_DELAY: Duration = Duration::from_millis(300);
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Asks for each logical button in turn. `next_press` blocks until a physical
/// button is pressed and returns its name, or `None` to abort.
pub fn assign_buttons<F>(base: &GamepadConfig, mut next_press: F) -> Option<GamepadConfig>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = base.clone();
    for logical in LOGICAL_BUTTONS {
        let prompt = display_name(logical);
        info!("Press {}", prompt);
        let physical = next_press(&prompt)?;
        info!("{} -> {}", prompt, physical);
        config.buttons.insert(logical.to_string(), physical);
    }
    Some(config)
}

fn wait_for_press(gilrs: &mut Gilrs, cancel: &CancellationToken) -> Option<String> {
    // drop anything queued during the previous prompt
    while gilrs.next_event().is_some() {}

    while !cancel.is_cancelled() {
        while let Some(event) = gilrs.next_event() {
            if let EventType::ButtonPressed(button, _) = event.event {
                thread::sleep(SETTLE_DELAY);
                return Some(button_name(button));
            }
        }
        thread::sleep(EVENT_POLL_INTERVAL);
    }
    None
}

/// Records a new mapping from the first gamepad and saves it into `config_dir`.
pub async fn run_calibration(config_dir: &Path, cancel: CancellationToken) -> Result<GamepadConfig> {
    let base = GamepadConfig::load_config(config_dir).await?;

    let config = tokio::task::spawn_blocking(move || -> Result<Option<GamepadConfig>> {
        let mut gilrs = open_gilrs()?;
        if gilrs.gamepads().all(|(_, gamepad)| !gamepad.is_connected()) {
            return Err(anyhow!("No gamepad connected"));
        }
        Ok(assign_buttons(&base, |_| wait_for_press(&mut gilrs, &cancel)))
    })
    .await
    .context("Calibration thread failed")??
    .ok_or_else(|| anyhow!("Calibration cancelled"))?;

    config.save_config(config_dir).await?;
    info!("Gamepad calibration saved");
    Ok(config)
}
