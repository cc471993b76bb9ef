use std::time::Duration;

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::heading_config::HeadingConfig;
use crate::core::bluetooth::connector::PeripheralConnector;
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::heading::StatusReporter;

/// Owns the background worker that keeps the compass connected.
pub struct HeadingMonitor {
    reporter: StatusReporter,
    cancel_token: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl HeadingMonitor {
    /// Spawns the connector. Subscribe to `reporter` before calling this to see the first reports.
    pub fn start<T>(transport: T, config: HeadingConfig, reporter: StatusReporter) -> Self
    where
        T: PeripheralTransport + 'static,
    {
        let cancel_token = CancellationToken::new();
        let shutdown_grace = config.shutdown_grace();
        let connector = PeripheralConnector::new(transport, config, reporter.clone());

        let cancel_token_for_task = cancel_token.clone();
        let handle = tokio::spawn(async move {
            connector.run(cancel_token_for_task).await;
        });
        info!("Heading monitor task started.");

        Self {
            reporter,
            cancel_token,
            task_handle: Some(handle),
            shutdown_grace,
        }
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Requests shutdown and waits up to the grace period for the worker to disconnect.
    pub async fn stop(&mut self) {
        info!("Stopping heading monitor.");
        self.cancel_token.cancel();

        let Some(mut handle) = self.task_handle.take() else {
            info!("No active heading monitor task to wait for.");
            return;
        };

        match tokio::time::timeout(self.shutdown_grace, &mut handle).await {
            Ok(Ok(())) => info!("Heading monitor finished after cancellation."),
            Ok(Err(e)) if e.is_cancelled() => info!("Heading monitor task was cancelled."),
            Ok(Err(e)) => error!("Heading monitor finished with an unexpected join error: {:?}", e),
            Err(_) => {
                warn!(
                    "Heading monitor did not stop within {} ms, aborting it",
                    self.shutdown_grace.as_millis()
                );
                handle.abort();
            }
        }
    }
}

impl Drop for HeadingMonitor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
