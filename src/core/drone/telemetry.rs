//! Drone state datagrams

use std::str::FromStr;

use anyhow::Context;
use log::{debug, info};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::drone::constants::ON_GROUND_HEIGHT_CM;
use crate::error::DroneError;

const STATE_BUFFER_SIZE: usize = 1024;

/// One state report, as sent by the drone about ten times a second.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DroneState {
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
    pub vgx: i32,
    pub vgy: i32,
    pub vgz: i32,
    pub templ: i32,
    pub temph: i32,
    /// Time-of-flight distance to the ground, cm
    pub tof: i32,
    /// Height above the takeoff point, cm
    pub height: i32,
    /// Battery percentage
    pub battery: u8,
    /// Barometer altitude, m
    pub baro: f32,
    /// Seconds the motors have been running
    pub motor_time: i32,
    pub agx: f32,
    pub agy: f32,
    pub agz: f32,
}

impl DroneState {
    pub fn temperature(&self) -> f32 {
        (self.templ + self.temph) as f32 / 2.0
    }

    pub fn is_on_ground(&self) -> bool {
        self.height < ON_GROUND_HEIGHT_CM
    }
}

fn number<T: FromStr>(key: &str, value: &str) -> Result<T, DroneError> {
    value
        .parse()
        .map_err(|_| DroneError::MalformedState(format!("bad value for '{}': '{}'", key, value)))
}

impl FromStr for DroneState {
    type Err = DroneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut state = DroneState::default();
        let mut fields = 0;

        for pair in s.trim().split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| DroneError::MalformedState(format!("missing ':' in '{}'", pair)))?;
            let value = value.trim();
            match key.trim() {
                "pitch" => state.pitch = number(key, value)?,
                "roll" => state.roll = number(key, value)?,
                "yaw" => state.yaw = number(key, value)?,
                "vgx" => state.vgx = number(key, value)?,
                "vgy" => state.vgy = number(key, value)?,
                "vgz" => state.vgz = number(key, value)?,
                "templ" => state.templ = number(key, value)?,
                "temph" => state.temph = number(key, value)?,
                "tof" => state.tof = number(key, value)?,
                "h" => state.height = number(key, value)?,
                "bat" => state.battery = number(key, value)?,
                "baro" => state.baro = number(key, value)?,
                "time" => state.motor_time = number(key, value)?,
                "agx" => state.agx = number(key, value)?,
                "agy" => state.agy = number(key, value)?,
                "agz" => state.agz = number(key, value)?,
                _ => continue,
            }
            fields += 1;
        }

        if fields == 0 {
            return Err(DroneError::MalformedState("no known fields".to_string()));
        }
        Ok(state)
    }
}

/// Receives state datagrams and keeps the latest one in a watch channel.
pub struct TelemetryListener {
    state_rx: watch::Receiver<Option<DroneState>>,
    task_handle: JoinHandle<()>,
}

impl TelemetryListener {
    pub async fn bind(addr: std::net::SocketAddr, cancel: CancellationToken) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind state port {}", addr))?;
        info!("Listening for drone state on {}", socket.local_addr()?);
        Ok(Self::spawn(socket, cancel))
    }

    fn spawn(socket: UdpSocket, cancel: CancellationToken) -> Self {
        let (state_tx, state_rx) = watch::channel(None);
        let task_handle = tokio::spawn(async move {
            let mut buf = [0u8; STATE_BUFFER_SIZE];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, _)) => {
                            let text = String::from_utf8_lossy(&buf[..len]);
                            match text.parse::<DroneState>() {
                                Ok(state) => {
                                    state_tx.send_replace(Some(state));
                                }
                                Err(e) => debug!("Skipping state datagram: {}", e),
                            }
                        }
                        Err(e) => debug!("State socket error: {}", e),
                    },
                }
            }
            debug!("Telemetry listener stopped");
        });
        Self { state_rx, task_handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DroneState>> {
        self.state_rx.clone()
    }

    pub fn latest(&self) -> Option<DroneState> {
        self.state_rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = "pitch:1;roll:-2;yaw:45;vgx:0;vgy:0;vgz:0;templ:60;temph:63;tof:10;h:0;bat:87;baro:12.34;time:0;agx:-5.00;agy:1.00;agz:-999.00;\r\n";

    #[test]
    fn parses_a_full_datagram() {
        let state: DroneState = SAMPLE.parse().unwrap();
        assert_eq!(state.yaw, 45);
        assert_eq!(state.roll, -2);
        assert_eq!(state.battery, 87);
        assert_eq!(state.height, 0);
        assert!((state.baro - 12.34).abs() < 1e-4);
        assert!((state.agz + 999.0).abs() < 1e-4);
        assert!((state.temperature() - 61.5).abs() < 1e-4);
        assert!(state.is_on_ground());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let state: DroneState = "mid:-1;x:0;h:120;bat:50;".parse().unwrap();
        assert_eq!(state.height, 120);
        assert!(!state.is_on_ground());
    }

    #[test]
    fn malformed_datagrams_are_rejected() {
        assert!("".parse::<DroneState>().is_err());
        assert!("hello".parse::<DroneState>().is_err());
        assert!("bat:lots;".parse::<DroneState>().is_err());
        assert!("mid:1;".parse::<DroneState>().is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_the_listener() {
        let cancel = CancellationToken::new();
        let listener = TelemetryListener::bind("127.0.0.1:0".parse().unwrap(), cancel.clone())
            .await
            .unwrap();
        let mut rx = listener.subscribe();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while listener.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(rx.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn listener_parses_datagrams_from_the_drone() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let listener = TelemetryListener::spawn(socket, cancel.clone());
        let mut rx = listener.subscribe();

        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        drone.send_to(b"garbage", addr).await.unwrap();
        drone.send_to(SAMPLE.as_bytes(), addr).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listener.latest().map(|s| s.battery), Some(87));
        cancel.cancel();
    }
}
