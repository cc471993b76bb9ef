use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::heading::parser::Heading;

const CHANNEL_CAPACITY: usize = 64;

/// A connection state transition and the reason for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

/// Fans heading readings and connection status changes out to any number of observers.
/// Every report is forwarded, repeated values included.
#[derive(Clone)]
pub struct StatusReporter {
    heading_tx: broadcast::Sender<Heading>,
    status_tx: broadcast::Sender<ConnectionStatus>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (heading_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (status_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { heading_tx, status_tx }
    }

    pub fn subscribe_headings(&self) -> broadcast::Receiver<Heading> {
        self.heading_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn report_heading(&self, heading: Heading) {
        debug!("Heading: {}", heading);
        // No subscribers is not an error
        let _ = self.heading_tx.send(heading);
    }

    pub fn report_status(&self, connected: bool, message: impl Into<String>) {
        let status = ConnectionStatus {
            connected,
            message: message.into(),
        };
        info!("Compass status: connected={} ({})", status.connected, status.message);
        let _ = self.status_tx.send(status);
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_headings_are_all_forwarded() {
        let reporter = StatusReporter::new();
        let mut headings = reporter.subscribe_headings();

        let heading = Heading::new(45).unwrap();
        reporter.report_heading(heading);
        reporter.report_heading(heading);

        assert_eq!(headings.recv().await.unwrap(), heading);
        assert_eq!(headings.recv().await.unwrap(), heading);
    }

    #[tokio::test]
    async fn status_reaches_every_subscriber() {
        let reporter = StatusReporter::new();
        let mut first = reporter.subscribe_status();
        let mut second = reporter.clone().subscribe_status();

        reporter.report_status(true, "Connected to ESP32");

        let expected = ConnectionStatus {
            connected: true,
            message: "Connected to ESP32".to_string(),
        };
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    #[test]
    fn reporting_without_subscribers_is_fine() {
        let reporter = StatusReporter::new();
        reporter.report_status(false, "Disconnected");
        reporter.report_heading(Heading::new(1).unwrap());
    }
}
