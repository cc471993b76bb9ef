//! Operator commands
//! This module defines the operations the console runs on behalf of the operator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::drone_config::DroneConfig;
use crate::core::drone::constants::ON_GROUND_HEIGHT_CM;
use crate::core::drone::{
    CommandSender, DroneController, DroneState, RcControl, TelemetryListener, UdpCommandSender,
    VideoReceiver,
};
use crate::core::{BluestTransport, FlyingMode, HeadingMonitor, ModeChange};
use crate::error::FlyingModeError;
use crate::mapping::{GamepadAction, GamepadInputs, GamepadMapper};
use crate::state::{AppState, CompassView, DroneLink};

/// Starts the compass monitor unless it is already running.
pub async fn start_heading_monitor(state: &AppState) -> Result<()> {
    let mut monitor = state.heading_monitor.lock().await;
    if monitor.as_ref().is_some_and(HeadingMonitor::is_running) {
        info!("Heading monitor already running");
        return Ok(());
    }

    let transport = BluestTransport::new()
        .await
        .context("Bluetooth adapter unavailable")?;
    *monitor = Some(HeadingMonitor::start(
        transport,
        state.config.heading.clone(),
        state.reporter.clone(),
    ));
    Ok(())
}

pub async fn stop_heading_monitor(state: &AppState) {
    if let Some(mut monitor) = state.heading_monitor.lock().await.take() {
        monitor.stop().await;
    }
}

/// Connects to the drone, starts telemetry and video. Returns the battery level.
pub async fn connect_drone(state: &AppState) -> Result<u8> {
    if let Some(controller) = state.drone_controller().await {
        if controller.is_connected() {
            return Ok(controller.battery().await?);
        }
    }

    // no lock is held while talking to the drone
    let (link, battery) = open_drone_link(&state.config.drone, &state.cancel_token).await?;

    let mut drone = state.drone.lock().await;
    if let Some(existing) = drone.as_ref() {
        if existing.controller.is_connected() {
            info!("Drone was connected concurrently, keeping the existing link");
            let controller = existing.controller.clone();
            drop(drone);
            link.controller.disconnect().await;
            return Ok(controller.battery().await?);
        }
    }
    *drone = Some(link);
    Ok(battery)
}

async fn open_drone_link(config: &DroneConfig, cancel: &CancellationToken) -> Result<(DroneLink, u8)> {
    let sender = UdpCommandSender::bind(config).await?;
    let controller = Arc::new(DroneController::new(sender));
    let battery = controller
        .connect()
        .await
        .with_context(|| format!("No answer from drone at {}", config.command_addr()))?;

    let telemetry = TelemetryListener::bind(config.state_bind_addr(), cancel.child_token()).await?;
    let (video, frames) = VideoReceiver::bind(
        config.video_bind_addr(),
        config.max_frame_bytes,
        cancel.child_token(),
    )
    .await?;
    let frames_received = Arc::new(AtomicU64::new(0));
    spawn_frame_sink(frames, frames_received.clone());

    tokio::time::sleep(config.video_start_delay()).await;
    if let Err(e) = controller.start_video().await {
        warn!("Video stream did not start: {}", e);
    }

    let link = DroneLink {
        controller,
        telemetry,
        video,
        frames_received,
    };
    Ok((link, battery))
}

// stands in for the display layer; frames are counted and dropped
fn spawn_frame_sink(mut frames: tokio::sync::mpsc::Receiver<Vec<u8>>, counter: Arc<AtomicU64>) {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if count == 1 {
                info!("First video frame received ({} bytes)", frame.len());
            }
        }
    });
}

pub async fn disconnect_drone(state: &AppState) {
    if let Some(link) = state.drone.lock().await.take() {
        link.controller.disconnect().await;
    }
}

/// Latest height reported by the drone, if any.
pub async fn drone_height(state: &AppState) -> Option<i32> {
    state
        .drone
        .lock()
        .await
        .as_ref()
        .and_then(|link| link.telemetry.latest())
        .map(|s| s.height)
}

pub async fn select_flying_mode(
    state: &AppState,
    mode: FlyingMode,
) -> std::result::Result<ModeChange, FlyingModeError> {
    let height = drone_height(state).await;
    state.flying_mode.lock().await.select(mode, height)
}

/// Puts the drone into SDK mode and applies new WiFi settings. The drone reboots afterwards.
pub async fn provision_wifi(config: &DroneConfig, ssid: &str, password: &str, station: bool) -> Result<()> {
    let controller = DroneController::new(UdpCommandSender::bind(config).await?);
    controller.connect().await?;
    if station {
        controller.join_access_point(ssid, password).await?;
        info!("Drone will reboot and join '{}'", ssid);
    } else {
        controller.set_wifi(ssid, password).await?;
        info!("Drone will reboot with SSID '{}'", ssid);
    }
    Ok(())
}

async fn run_action<S: CommandSender>(controller: &DroneController<S>, action: GamepadAction) {
    let result = match action {
        GamepadAction::TakeOff => controller.take_off().await,
        GamepadAction::Land => controller.land().await,
        GamepadAction::RotateLeft90 => controller.rotate_left_90().await,
        GamepadAction::RotateRight90 => controller.rotate_right_90().await,
    };
    if let Err(e) = result {
        warn!("{:?} failed: {}", action, e);
    }
}

/// One control step: fire pending actions, then send the sticks. No gamepad means hover.
pub async fn control_tick<S: CommandSender>(
    controller: &DroneController<S>,
    mapper: &mut GamepadMapper,
    inputs: Option<&GamepadInputs>,
) -> RcControl {
    let rc = match inputs {
        Some(inputs) => {
            let mapped = mapper.update(inputs);
            for action in mapped.actions {
                run_action(controller, action).await;
            }
            mapped.rc
        }
        None => {
            mapper.reset();
            RcControl::default()
        }
    };
    if let Err(e) = controller.send_rc_control(rc).await {
        debug!("rc not sent: {}", e);
    }
    rc
}

/// Runs the control tick every control interval while the drone is connected.
pub async fn run_control_loop(
    state: Arc<AppState>,
    inputs: watch::Receiver<Option<GamepadInputs>>,
    cancel: CancellationToken,
) {
    let mut mapper = GamepadMapper::new(&state.gamepad_config, state.config.drone.invert_forward_back);
    let mut ticker = interval(state.config.drone.control_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Control loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(controller) = state.drone_controller().await else {
            continue;
        };
        if !controller.is_connected() {
            continue;
        }
        let current = inputs.borrow().clone();
        let rc = control_tick(&controller, &mut mapper, current.as_ref()).await;
        *state.rc.lock().await = rc;
    }
    info!("Control loop stopped");
}

/// What the HUD shows
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub drone: Option<DroneState>,
    pub drone_connected: bool,
    pub rc: RcControl,
    pub gamepad_connected: bool,
    pub heading: Option<u16>,
    pub compass_connected: bool,
    pub compass_message: String,
    pub flying_mode: FlyingMode,
    pub video_frames: u64,
}

impl TelemetrySnapshot {
    pub fn new(
        drone: Option<DroneState>,
        drone_connected: bool,
        rc: RcControl,
        gamepad_connected: bool,
        compass: CompassView,
        flying_mode: FlyingMode,
        video_frames: u64,
    ) -> Self {
        Self {
            drone,
            drone_connected,
            rc,
            gamepad_connected,
            heading: compass.heading.map(|h| h.degrees()),
            compass_connected: compass.status.connected,
            compass_message: compass.status.message,
            flying_mode,
            video_frames,
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.drone, self.drone_connected) {
            (Some(s), true) => write!(
                f,
                "BAT {}% | H {} cm | TOF {} cm | YAW {}° | SPD {}/{}/{} | TEMP {:.1}°C",
                s.battery,
                s.height,
                s.tof,
                s.yaw,
                s.vgx,
                s.vgy,
                s.vgz,
                s.temperature()
            )?,
            (None, true) => write!(f, "Drone connected, waiting for state")?,
            _ => write!(f, "Drone offline")?,
        }
        write!(
            f,
            " | RC {} {} {} {}",
            self.rc.left_right, self.rc.forward_back, self.rc.up_down, self.rc.yaw
        )?;
        write!(f, " | PAD {}", if self.gamepad_connected { "on" } else { "off" })?;
        match self.heading {
            Some(degrees) => write!(f, " | HDG {}°", degrees)?,
            None => write!(f, " | HDG --")?,
        }
        write!(f, " | {} | {}", self.compass_message, self.flying_mode)
    }
}

pub async fn telemetry_snapshot(state: &AppState, gamepad_connected: bool) -> TelemetrySnapshot {
    let (drone, drone_connected, video_frames) = match state.drone.lock().await.as_ref() {
        Some(link) => (
            link.telemetry.latest(),
            link.controller.is_connected(),
            link.frames_received.load(Ordering::Relaxed),
        ),
        None => (None, false, 0),
    };
    TelemetrySnapshot::new(
        drone,
        drone_connected,
        *state.rc.lock().await,
        gamepad_connected,
        state.compass_view(),
        state.flying_mode.lock().await.current(),
        video_frames,
    )
}

/// Stops workers, lands if airborne, disconnects the drone and stops the compass monitor.
pub async fn shutdown(state: &AppState) {
    info!("Shutting down");
    let height = drone_height(state).await;
    state.cancel_token.cancel();

    if let Some(controller) = state.drone_controller().await {
        if controller.is_connected() && height.is_some_and(|h| h >= ON_GROUND_HEIGHT_CM) {
            info!("Drone is airborne, landing before exit");
            if let Err(e) = controller.land().await {
                warn!("Landing failed: {}", e);
            }
        }
    }
    disconnect_drone(state).await;
    stop_heading_monitor(state).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::gamepad_config::GamepadConfig;
    use crate::config::AppConfig;
    use crate::core::drone::testing::{connected_controller, RecordingSender};
    use crate::core::{ConnectionStatus, Heading};

    fn inputs(buttons: &[&str], right_y: f32) -> GamepadInputs {
        GamepadInputs {
            right_y,
            buttons: buttons.iter().map(|b| (b.to_string(), true)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tick_runs_actions_before_sticks() {
        let (controller, sender) = connected_controller().await;
        let mut mapper = GamepadMapper::new(&GamepadConfig::default(), false);

        let rc = control_tick(&controller, &mut mapper, Some(&inputs(&["r1"], 0.5))).await;
        assert_eq!(rc.forward_back, 50);
        control_tick(&controller, &mut mapper, Some(&inputs(&["r1"], 0.0))).await;

        assert_eq!(sender.sent(), vec!["takeoff", "rc 0 50 0 0", "rc 0 0 0 0"]);
    }

    #[tokio::test]
    async fn missing_gamepad_hovers() {
        let (controller, sender) = connected_controller().await;
        let mut mapper = GamepadMapper::new(&GamepadConfig::default(), false);

        control_tick(&controller, &mut mapper, Some(&inputs(&["l1"], 0.0))).await;
        control_tick(&controller, &mut mapper, None).await;
        control_tick(&controller, &mut mapper, Some(&inputs(&["l1"], 0.0))).await;

        assert_eq!(
            sender.sent(),
            vec!["land", "rc 0 0 0 0", "rc 0 0 0 0", "land", "rc 0 0 0 0"]
        );
    }

    #[tokio::test]
    async fn failed_action_does_not_stop_the_tick() {
        let (controller, sender) = connected_controller().await;
        sender.reply(Err(crate::error::DroneError::Timeout("takeoff".into())));
        let mut mapper = GamepadMapper::new(&GamepadConfig::default(), false);

        control_tick(&controller, &mut mapper, Some(&inputs(&["r1"], 0.0))).await;
        assert_eq!(sender.sent(), vec!["takeoff", "rc 0 0 0 0"]);
    }

    #[tokio::test]
    async fn disconnected_drone_gets_nothing() {
        let sender = RecordingSender::default();
        let controller = DroneController::new(sender.clone());
        let mut mapper = GamepadMapper::new(&GamepadConfig::default(), false);

        control_tick(&controller, &mut mapper, Some(&inputs(&["r1"], 1.0))).await;
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn hud_line_shows_everything() {
        let state: DroneState = "h:120;bat:76;tof:130;yaw:-12;templ:40;temph:42;".parse().unwrap();
        let compass = CompassView {
            heading: Heading::new(270),
            status: ConnectionStatus {
                connected: true,
                message: "Connected to ESP32".to_string(),
            },
        };
        let snapshot = TelemetrySnapshot::new(
            Some(state),
            true,
            RcControl::new(0, 10, 0, -5),
            true,
            compass,
            FlyingMode::Manual,
            3,
        );
        assert_eq!(
            snapshot.to_string(),
            "BAT 76% | H 120 cm | TOF 130 cm | YAW -12° | SPD 0/0/0 | TEMP 41.0°C | RC 0 10 0 -5 | PAD on | HDG 270° | Connected to ESP32 | Manual"
        );
    }

    #[test]
    fn hud_line_when_offline() {
        let snapshot = TelemetrySnapshot::new(
            None,
            false,
            RcControl::default(),
            false,
            CompassView::default(),
            FlyingMode::Manual,
            0,
        );
        assert_eq!(
            snapshot.to_string(),
            "Drone offline | RC 0 0 0 0 | PAD off | HDG -- | Not started | Manual"
        );
    }

    #[tokio::test]
    async fn mode_selection_without_a_drone() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::new(tmp.path().to_path_buf(), AppConfig::default(), GamepadConfig::default());

        assert_eq!(
            select_flying_mode(&state, FlyingMode::Autopilot).await,
            Err(FlyingModeError::Unavailable(FlyingMode::Autopilot))
        );
        assert_eq!(select_flying_mode(&state, FlyingMode::Manual).await, Ok(ModeChange::Unchanged));

        let snapshot = telemetry_snapshot(&state, false).await;
        assert!(!snapshot.drone_connected);
        assert_eq!(snapshot.flying_mode, FlyingMode::Manual);

        shutdown(&state).await;
        assert!(state.cancel_token.is_cancelled());
    }

    struct FakeDrone {
        addr: std::net::SocketAddr,
        received: Arc<std::sync::Mutex<Vec<String>>>,
    }

    // answers every command; `silent` drops them instead
    async fn fake_drone(silent: bool) -> FakeDrone {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = received.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let text = String::from_utf8_lossy(&buf[..len]).to_string();
                log.lock().unwrap().push(text.clone());
                if silent {
                    continue;
                }
                let reply: &[u8] = if text == "battery?" { b"87" } else { b"ok" };
                let _ = socket.send_to(reply, from).await;
            }
        });
        FakeDrone { addr, received }
    }

    fn state_for(drone: &FakeDrone, tmp: &tempfile::TempDir) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.drone.address = drone.addr.ip();
        config.drone.command_port = drone.addr.port();
        config.drone.state_port = 0;
        config.drone.video_port = 0;
        config.drone.response_timeout_ms = 300;
        config.drone.video_start_delay_ms = 300;
        Arc::new(AppState::new(tmp.path().to_path_buf(), config, GamepadConfig::default()))
    }

    #[tokio::test]
    async fn connecting_does_not_hold_the_drone_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let drone = fake_drone(true).await;
        let state = state_for(&drone, &tmp);

        let pending = tokio::spawn({
            let state = state.clone();
            async move { connect_drone(&state).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(state.drone.try_lock().is_ok());
        let _ = telemetry_snapshot(&state, false).await;

        assert!(pending.await.unwrap().is_err());
        assert!(state.drone_controller().await.is_none());
        assert_eq!(drone.received.lock().unwrap().first().map(String::as_str), Some("command"));
    }

    #[tokio::test]
    async fn connected_link_is_stored_and_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let drone = fake_drone(false).await;
        let state = state_for(&drone, &tmp);

        let pending = tokio::spawn({
            let state = state.clone();
            async move { connect_drone(&state).await }
        });
        // inside the video start delay
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert!(state.drone.try_lock().is_ok());

        assert_eq!(pending.await.unwrap().unwrap(), 87);
        assert!(state.drone_controller().await.is_some_and(|c| c.is_connected()));
        assert_eq!(connect_drone(&state).await.unwrap(), 87);
        assert_eq!(
            *drone.received.lock().unwrap(),
            vec!["command", "battery?", "streamon", "battery?"]
        );

        shutdown(&state).await;
        assert!(state.drone_controller().await.is_none());
    }
}
