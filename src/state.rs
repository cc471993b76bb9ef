//! Application state management
//! This module defines and manages the shared console state.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use log::debug;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::gamepad_config::GamepadConfig;
use crate::config::AppConfig;
use crate::core::drone::{DroneController, RcControl, TelemetryListener, UdpCommandSender, VideoReceiver};
use crate::core::{ConnectionStatus, FlyingModeSelector, Heading, HeadingMonitor, StatusReporter};

/// Latest compass reading and link status, as shown on the HUD.
#[derive(Debug, Clone, PartialEq)]
pub struct CompassView {
    pub heading: Option<Heading>,
    pub status: ConnectionStatus,
}

impl Default for CompassView {
    fn default() -> Self {
        Self {
            heading: None,
            status: ConnectionStatus {
                connected: false,
                message: "Not started".to_string(),
            },
        }
    }
}

/// Everything that exists while the drone is connected.
pub struct DroneLink {
    pub controller: Arc<DroneController<UdpCommandSender>>,
    pub telemetry: TelemetryListener,
    pub video: VideoReceiver,
    pub frames_received: Arc<AtomicU64>,
}

/// Shared console state
pub struct AppState {
    pub config_dir: PathBuf,
    pub config: AppConfig,
    pub gamepad_config: GamepadConfig,
    pub reporter: StatusReporter,
    pub heading_monitor: Mutex<Option<HeadingMonitor>>,
    pub drone: Mutex<Option<DroneLink>>,
    pub flying_mode: Mutex<FlyingModeSelector>,
    pub rc: Mutex<RcControl>,
    pub compass: watch::Receiver<CompassView>,
    /// Cancels every worker except the heading monitor, which has its own token
    pub cancel_token: CancellationToken,
}

impl AppState {
    /// Creates the state and starts tracking compass reports. Must run inside a tokio runtime.
    pub fn new(config_dir: PathBuf, config: AppConfig, gamepad_config: GamepadConfig) -> Self {
        let reporter = StatusReporter::new();
        let cancel_token = CancellationToken::new();
        let compass = track_compass(&reporter, cancel_token.clone());

        Self {
            config_dir,
            config,
            gamepad_config,
            reporter,
            heading_monitor: Mutex::new(None),
            drone: Mutex::new(None),
            flying_mode: Mutex::new(FlyingModeSelector::default()),
            rc: Mutex::new(RcControl::default()),
            compass,
            cancel_token,
        }
    }

    pub fn compass_view(&self) -> CompassView {
        self.compass.borrow().clone()
    }

    /// Controller handle, if the drone is connected.
    pub async fn drone_controller(&self) -> Option<Arc<DroneController<UdpCommandSender>>> {
        self.drone.lock().await.as_ref().map(|link| link.controller.clone())
    }
}

fn track_compass(reporter: &StatusReporter, cancel: CancellationToken) -> watch::Receiver<CompassView> {
    let (view_tx, view_rx) = watch::channel(CompassView::default());
    let mut headings = reporter.subscribe_headings();
    let mut statuses = reporter.subscribe_status();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                heading = headings.recv() => match heading {
                    Ok(heading) => view_tx.send_modify(|view| view.heading = Some(heading)),
                    Err(RecvError::Lagged(skipped)) => debug!("HUD skipped {} headings", skipped),
                    Err(RecvError::Closed) => break,
                },
                status = statuses.recv() => match status {
                    Ok(status) => view_tx.send_modify(|view| {
                        if !status.connected {
                            view.heading = None;
                        }
                        view.status = status;
                    }),
                    Err(RecvError::Lagged(skipped)) => debug!("HUD skipped {} status reports", skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    view_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn compass_view_follows_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::new(tmp.path().to_path_buf(), AppConfig::default(), GamepadConfig::default());
        let mut view = state.compass.clone();

        state.reporter.report_status(true, "Connected to ESP32");
        state.reporter.report_heading(Heading::new(90).unwrap());

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                {
                    let current = view.borrow_and_update();
                    if current.heading.is_some() && current.status.connected {
                        break;
                    }
                }
                view.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        let current = state.compass_view();
        assert_eq!(current.heading.map(|h| h.degrees()), Some(90));
        assert!(current.status.connected);

        state.reporter.report_status(false, "Connection lost: peripheral disconnected");
        tokio::time::timeout(Duration::from_secs(1), async {
            while view.borrow_and_update().status.connected {
                view.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(state.compass_view().heading.is_none());
        assert!(state.drone_controller().await.is_none());
    }
}
