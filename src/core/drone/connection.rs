//! UDP command link to the drone

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::config::drone_config::DroneConfig;
use crate::core::drone::commands::{CommandSender, TelloCommand, Timeouts};
use crate::error::{DroneError, Result};

const RESPONSE_BUFFER_SIZE: usize = 1024;

/// Sends SDK commands from an ephemeral local port and waits for the reply.
pub struct UdpCommandSender {
    socket: UdpSocket,
    target: SocketAddr,
    timeouts: Timeouts,
    // one command awaiting a reply at a time
    in_flight: Mutex<()>,
}

impl UdpCommandSender {
    pub async fn bind(config: &DroneConfig) -> Result<Self> {
        let timeouts = Timeouts {
            standard: config.response_timeout(),
            motion: config.motion_timeout(),
        };
        Self::bind_to(config.command_addr(), timeouts).await
    }

    pub async fn bind_to(target: SocketAddr, timeouts: Timeouts) -> Result<Self> {
        let local_ip = if target.ip().is_loopback() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        debug!(
            "Command socket bound to {} for drone at {}",
            socket.local_addr()?,
            target
        );
        Ok(Self {
            socket,
            target,
            timeouts,
            in_flight: Mutex::new(()),
        })
    }

    /// Discards replies that arrived after their command timed out.
    fn drain_stale(&self) -> Result<()> {
        let mut buf = [0u8; RESPONSE_BUFFER_SIZE];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, from)) => {
                    debug!(
                        "Dropping stale datagram from {}: {}",
                        from,
                        String::from_utf8_lossy(&buf[..len]).trim()
                    );
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn await_reply(&self, command: &TelloCommand) -> Result<String> {
        let mut buf = [0u8; RESPONSE_BUFFER_SIZE];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if from != self.target {
                warn!("Ignoring datagram from unexpected peer {}", from);
                continue;
            }
            let reply = String::from_utf8_lossy(&buf[..len]).trim().to_string();
            debug!("'{}' -> '{}'", command, reply);
            return Ok(reply);
        }
    }
}

#[async_trait]
impl CommandSender for UdpCommandSender {
    async fn send_command(&self, command: TelloCommand) -> Result<Option<String>> {
        let wire = command.to_sdk_string();

        if !command.expects_response() {
            trace!("Sending '{}'", wire);
            self.socket.send_to(wire.as_bytes(), self.target).await?;
            return Ok(None);
        }

        let _guard = self.in_flight.lock().await;
        self.drain_stale()?;

        debug!("Sending '{}'", command);
        self.socket.send_to(wire.as_bytes(), self.target).await?;

        let timeout = self.timeouts.for_command(&command);
        let reply = tokio::time::timeout(timeout, self.await_reply(&command))
            .await
            .map_err(|_| DroneError::Timeout(command.to_string()))??;

        command.check_response(&reply).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn fake_drone() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn short_timeouts() -> Timeouts {
        Timeouts {
            standard: Duration::from_millis(200),
            motion: Duration::from_millis(400),
        }
    }

    async fn expect_datagram(drone: &UdpSocket) -> (String, SocketAddr) {
        let mut buf = [0u8; 256];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), drone.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        (String::from_utf8_lossy(&buf[..len]).to_string(), from)
    }

    #[tokio::test]
    async fn ok_reply_is_returned() {
        let (drone, addr) = fake_drone().await;
        let sender = UdpCommandSender::bind_to(addr, short_timeouts()).await.unwrap();

        let responder = tokio::spawn(async move {
            let (text, from) = expect_datagram(&drone).await;
            assert_eq!(text, "command");
            drone.send_to(b"ok\r\n", from).await.unwrap();
        });

        let reply = sender.send_command(TelloCommand::Command).await.unwrap();
        assert_eq!(reply.as_deref(), Some("ok"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn error_reply_is_a_rejection() {
        let (drone, addr) = fake_drone().await;
        let sender = UdpCommandSender::bind_to(addr, short_timeouts()).await.unwrap();

        tokio::spawn(async move {
            let (_, from) = expect_datagram(&drone).await;
            drone.send_to(b"error Motor stop", from).await.unwrap();
        });

        let err = sender.send_command(TelloCommand::TakeOff).await.unwrap_err();
        assert!(matches!(err, DroneError::CommandRejected { ref response, .. } if response == "error Motor stop"));
    }

    #[tokio::test]
    async fn silence_times_out() {
        let (_drone, addr) = fake_drone().await;
        let sender = UdpCommandSender::bind_to(addr, short_timeouts()).await.unwrap();

        let err = sender.send_command(TelloCommand::QueryBattery).await.unwrap_err();
        assert!(matches!(err, DroneError::Timeout(ref c) if c == "battery?"));
    }

    #[tokio::test]
    async fn rc_does_not_wait_for_a_reply() {
        let (drone, addr) = fake_drone().await;
        let sender = UdpCommandSender::bind_to(addr, short_timeouts()).await.unwrap();

        let reply = sender
            .send_command(TelloCommand::Rc(Default::default()))
            .await
            .unwrap();
        assert!(reply.is_none());
        let (text, _) = expect_datagram(&drone).await;
        assert_eq!(text, "rc 0 0 0 0");
    }

    #[tokio::test]
    async fn late_reply_is_not_mistaken_for_the_next_one() {
        let (drone, addr) = fake_drone().await;
        let sender = UdpCommandSender::bind_to(addr, short_timeouts()).await.unwrap();

        // first command times out, its reply arrives afterwards
        let (_, from) = {
            let pending = sender.send_command(TelloCommand::QueryBattery);
            let (result, datagram) = tokio::join!(pending, expect_datagram(&drone));
            assert!(matches!(result, Err(DroneError::Timeout(_))));
            datagram
        };
        drone.send_to(b"55", from).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let responder = tokio::spawn(async move {
            let (text, from) = expect_datagram(&drone).await;
            assert_eq!(text, "battery?");
            drone.send_to(b"87", from).await.unwrap();
        });

        let reply = sender.send_command(TelloCommand::QueryBattery).await.unwrap();
        assert_eq!(reply.as_deref(), Some("87"));
        responder.await.unwrap();
    }
}
