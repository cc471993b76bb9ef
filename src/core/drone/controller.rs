//! High level drone operations on top of a [`CommandSender`]

use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::core::drone::commands::{CommandSender, RcControl, TelloCommand};
use crate::error::{DroneError, Result};

const QUARTER_TURN: u16 = 90;
const MIN_AP_PASSWORD_LEN: usize = 8;

/// Drone controller
pub struct DroneController<S: CommandSender> {
    command_sender: S,
    connected: AtomicBool,
}

impl<S: CommandSender> DroneController<S> {
    pub fn new(command_sender: S) -> Self {
        Self {
            command_sender,
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DroneError::NotConnected)
        }
    }

    async fn send(&self, command: TelloCommand) -> Result<Option<String>> {
        self.command_sender.send_command(command).await
    }

    /// Enters SDK mode and reads the battery. Returns the battery percentage.
    pub async fn connect(&self) -> Result<u8> {
        info!("Entering SDK mode");
        self.send(TelloCommand::Command).await?;
        self.connected.store(true, Ordering::SeqCst);

        match self.battery().await {
            Ok(level) => {
                info!("Connected! Battery: {}%", level);
                Ok(level)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Stops the video stream best-effort and marks the link down.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.send(TelloCommand::StreamOff).await {
            warn!("streamoff failed during disconnect: {}", e);
        }
        info!("Drone disconnected");
    }

    pub async fn take_off(&self) -> Result<()> {
        self.ensure_connected()?;
        info!("Taking off");
        self.send(TelloCommand::TakeOff).await?;
        Ok(())
    }

    pub async fn land(&self) -> Result<()> {
        self.ensure_connected()?;
        info!("Landing");
        self.send(TelloCommand::Land).await?;
        Ok(())
    }

    pub async fn emergency(&self) -> Result<()> {
        self.ensure_connected()?;
        warn!("Emergency motor stop");
        self.send(TelloCommand::Emergency).await?;
        Ok(())
    }

    pub async fn send_rc_control(&self, rc: RcControl) -> Result<()> {
        self.ensure_connected()?;
        self.send(TelloCommand::Rc(rc)).await?;
        Ok(())
    }

    pub async fn rotate_left_90(&self) -> Result<()> {
        self.ensure_connected()?;
        self.send(TelloCommand::RotateCounterClockwise(QUARTER_TURN)).await?;
        Ok(())
    }

    pub async fn rotate_right_90(&self) -> Result<()> {
        self.ensure_connected()?;
        self.send(TelloCommand::RotateClockwise(QUARTER_TURN)).await?;
        Ok(())
    }

    pub async fn battery(&self) -> Result<u8> {
        self.ensure_connected()?;
        let reply = self.send(TelloCommand::QueryBattery).await?.unwrap_or_default();
        reply
            .trim()
            .parse::<u8>()
            .map_err(|_| DroneError::UnexpectedResponse {
                command: TelloCommand::QueryBattery.to_string(),
                response: reply.clone(),
            })
    }

    pub async fn start_video(&self) -> Result<()> {
        self.ensure_connected()?;
        info!("Starting video stream");
        self.send(TelloCommand::StreamOn).await?;
        Ok(())
    }

    pub async fn stop_video(&self) -> Result<()> {
        self.ensure_connected()?;
        info!("Stopping video stream");
        self.send(TelloCommand::StreamOff).await?;
        Ok(())
    }

    /// Renames the drone's own access point. The drone reboots afterwards.
    pub async fn set_wifi(&self, ssid: &str, password: &str) -> Result<()> {
        validate_ssid(ssid)?;
        info!("Setting drone WiFi SSID to '{}'", ssid);
        self.send(TelloCommand::SetWifi {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Switches the drone to station mode on an existing network.
    pub async fn join_access_point(&self, ssid: &str, password: &str) -> Result<()> {
        validate_ssid(ssid)?;
        if password.chars().count() < MIN_AP_PASSWORD_LEN {
            return Err(DroneError::InvalidCredentials(format!(
                "password must be at least {} characters",
                MIN_AP_PASSWORD_LEN
            )));
        }
        info!("Joining access point '{}'", ssid);
        self.send(TelloCommand::JoinAccessPoint {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
        .await?;
        Ok(())
    }
}

fn validate_ssid(ssid: &str) -> Result<()> {
    if ssid.is_empty() {
        return Err(DroneError::InvalidCredentials("SSID must not be empty".to_string()));
    }
    if ssid.chars().any(char::is_whitespace) {
        return Err(DroneError::InvalidCredentials(
            "SSID must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}
