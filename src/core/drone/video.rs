//! Raw H.264 video stream reassembly

use std::net::SocketAddr;

use anyhow::Context;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::drone::constants::{VIDEO_CHANNEL_CAPACITY, VIDEO_PACKET_SIZE};

/// Joins video datagrams into frames. A datagram shorter than a full packet ends the frame.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    overflowed: bool,
}

impl FrameAssembler {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
            overflowed: false,
        }
    }

    /// Adds one datagram. Returns the frame when this datagram completes it.
    pub fn push(&mut self, datagram: &[u8]) -> Option<Vec<u8>> {
        if !self.overflowed {
            if self.buffer.len() + datagram.len() > self.max_frame_bytes {
                warn!(
                    "Video frame exceeded {} bytes, discarding it",
                    self.max_frame_bytes
                );
                self.buffer.clear();
                self.overflowed = true;
            } else {
                self.buffer.extend_from_slice(datagram);
            }
        }

        if datagram.len() == VIDEO_PACKET_SIZE {
            return None;
        }

        // end of frame
        if std::mem::take(&mut self.overflowed) || self.buffer.is_empty() {
            self.buffer.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Receives the video stream and forwards complete frames.
pub struct VideoReceiver {
    task_handle: JoinHandle<()>,
}

impl VideoReceiver {
    /// Binds the video port. Frames arrive on the returned channel; when it is full new frames are dropped.
    pub async fn bind(
        addr: SocketAddr,
        max_frame_bytes: usize,
        cancel: CancellationToken,
    ) -> anyhow::Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind video port {}", addr))?;
        info!("Listening for video on {}", socket.local_addr()?);
        Ok(Self::spawn(socket, max_frame_bytes, cancel))
    }

    fn spawn(
        socket: UdpSocket,
        max_frame_bytes: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (frame_tx, frame_rx) = mpsc::channel(VIDEO_CHANNEL_CAPACITY);
        let task_handle = tokio::spawn(async move {
            let mut assembler = FrameAssembler::new(max_frame_bytes);
            let mut buf = vec![0u8; 2048];
            let mut dropped: u64 = 0;
            loop {
                let len = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, _)) => len,
                        Err(e) => {
                            debug!("Video socket error: {}", e);
                            continue;
                        }
                    },
                };
                let Some(frame) = assembler.push(&buf[..len]) else {
                    continue;
                };
                match frame_tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        debug!("Display is behind, dropped {} frames so far", dropped);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Frame consumer went away");
                        break;
                    }
                }
            }
            debug!("Video receiver stopped");
        });
        (Self { task_handle }, frame_rx)
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn short_datagram_completes_the_frame() {
        let mut assembler = FrameAssembler::new(10_000);
        let full = vec![1u8; VIDEO_PACKET_SIZE];

        assert!(assembler.push(&full).is_none());
        assert!(assembler.push(&full).is_none());
        let frame = assembler.push(&[2u8; 100]).unwrap();

        assert_eq!(frame.len(), 2 * VIDEO_PACKET_SIZE + 100);
        assert_eq!(frame[frame.len() - 1], 2);
        assert_eq!(assembler.pending_bytes(), 0);
    }

    #[test]
    fn oversized_frame_is_discarded_and_assembly_restarts() {
        let mut assembler = FrameAssembler::new(2 * VIDEO_PACKET_SIZE);
        let full = vec![0u8; VIDEO_PACKET_SIZE];

        for _ in 0..3 {
            assert!(assembler.push(&full).is_none());
        }
        assert!(assembler.push(&[0u8; 10]).is_none());

        assert_eq!(assembler.push(&[7u8; 5]), Some(vec![7u8; 5]));
    }

    #[tokio::test]
    async fn frames_are_forwarded_and_dropped_when_full() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let (receiver, mut frames) = VideoReceiver::spawn(socket, 10_000, cancel.clone());

        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..(VIDEO_CHANNEL_CAPACITY + 3) {
            drone.send_to(&[i as u8; 8], addr).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut received = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            received.push(frame[0]);
        }
        assert_eq!(received.len(), VIDEO_CHANNEL_CAPACITY);
        assert_eq!(received[0], 0);
        assert!(receiver.is_running());

        cancel.cancel();
    }
}
