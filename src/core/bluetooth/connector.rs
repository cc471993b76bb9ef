//! Supervisory loop for the heading peripheral
//! Scans, connects, picks a data path and keeps reconnecting at a fixed interval

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::heading_config::HeadingConfig;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::transport::PeripheralTransport;
use crate::core::bluetooth::types::{
    choose_characteristic, select_peripheral, DataPath, NotificationReceiver, PeripheralSession,
};
use crate::core::heading::StatusReporter;

/// Drives the scan/connect/receive cycle for one peripheral
pub struct PeripheralConnector<T: PeripheralTransport> {
    transport: T,
    config: HeadingConfig,
    reporter: StatusReporter,
    notification_handler: NotificationHandler,
    session: Option<PeripheralSession<T::Peripheral, T::Characteristic>>,
}

impl<T: PeripheralTransport> PeripheralConnector<T> {
    pub fn new(transport: T, config: HeadingConfig, reporter: StatusReporter) -> Self {
        Self {
            transport,
            config,
            notification_handler: NotificationHandler::new(reporter.clone()),
            reporter,
            session: None,
        }
    }

    /// Runs until `cancel` fires, then disconnects and reports "Disconnected".
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Heading connector started, looking for '{}'",
            self.config.device_name_pattern
        );

        while !cancel.is_cancelled() {
            let pause = self.attempt(&cancel).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }

        self.close_session().await;
        self.reporter.report_status(false, "Disconnected");
        info!("Heading connector stopped");
    }

    /// One connect-and-receive cycle. Returns how long to wait before the next one.
    async fn attempt(&mut self, cancel: &CancellationToken) -> Duration {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return Duration::ZERO,
            result = self.connect() => result,
        };

        match connected {
            Ok(Some(path)) => {
                let reason = self.receive(path, cancel).await;
                if cancel.is_cancelled() {
                    return Duration::ZERO;
                }
                warn!("{}", reason);
                self.close_session().await;
                self.reporter.report_status(false, reason);
                self.config.retry_delay()
            }
            Ok(None) => self.config.idle_interval(),
            Err(e) => {
                error!("Connection error: {:#}", e);
                self.close_session().await;
                self.reporter
                    .report_status(false, format!("Connection error: {}", e));
                self.config.retry_delay()
            }
        }
    }

    async fn connect(&mut self) -> Result<Option<DataPath<T::Characteristic>>> {
        let pattern = self.config.device_name_pattern.clone();
        let devices = self.transport.scan(self.config.scan_timeout()).await?;

        let Some(target) = select_peripheral(devices, &pattern) else {
            self.reporter.report_status(
                false,
                format!("{} device not found (looking for '{}')", pattern, pattern),
            );
            return Ok(None);
        };

        let name = target.display_name();
        info!("Found {} ({}), RSSI {:?}", name, target.id, target.rssi);
        let peripheral = target.handle.clone();
        self.session = Some(PeripheralSession::new(target.id, name.clone(), target.handle));

        self.transport.connect(&peripheral).await?;
        if let Some(session) = self.session.as_mut() {
            session.connected = true;
        }
        self.reporter.report_status(true, format!("Connected to {}", name));

        let path = self.open_data_path(&peripheral).await?;
        Ok(Some(path))
    }

    /// Known characteristic first, then any notifying one, then any readable one,
    /// finally polling the known characteristic.
    async fn open_data_path(&mut self, peripheral: &T::Peripheral) -> Result<DataPath<T::Characteristic>> {
        let known_uuid = self.config.characteristic_uuid;
        let service_uuid = self.config.service_uuid;
        let mut excluded: Vec<Uuid> = Vec::new();

        let known = match self.transport.find_characteristic(peripheral, service_uuid, known_uuid).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Lookup of characteristic {} failed: {}", known_uuid, e);
                None
            }
        };

        match &known {
            Some(info) => match self.transport.subscribe(&info.handle).await {
                Ok(stream) => {
                    info!("Subscribed to characteristic {}", known_uuid);
                    self.remember_characteristic(info.handle.clone());
                    return Ok(DataPath::Notify { uuid: known_uuid, stream });
                }
                Err(e) => {
                    warn!("Subscribing to {} failed: {}", known_uuid, e);
                    excluded.push(known_uuid);
                }
            },
            None => info!("Characteristic {} not found, enumerating services", known_uuid),
        }

        let mut candidates = match self.transport.characteristics(peripheral).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Service discovery failed: {}", e);
                Vec::new()
            }
        };
        // characteristics of the compass service go first
        candidates.sort_by_key(|c| c.service != service_uuid);

        while let Some(candidate) = choose_characteristic(&candidates, &excluded) {
            if !candidate.notify {
                info!("Polling readable characteristic {}", candidate.uuid);
                self.remember_characteristic(candidate.handle.clone());
                return Ok(DataPath::Poll {
                    uuid: candidate.uuid,
                    characteristic: candidate.handle.clone(),
                });
            }
            match self.transport.subscribe(&candidate.handle).await {
                Ok(stream) => {
                    info!("Subscribed to characteristic {}", candidate.uuid);
                    self.remember_characteristic(candidate.handle.clone());
                    return Ok(DataPath::Notify { uuid: candidate.uuid, stream });
                }
                Err(e) => {
                    warn!("Subscribing to {} failed: {}", candidate.uuid, e);
                    excluded.push(candidate.uuid);
                }
            }
        }

        match known {
            Some(info) => {
                info!("Falling back to polling characteristic {}", known_uuid);
                self.remember_characteristic(info.handle.clone());
                Ok(DataPath::Poll { uuid: known_uuid, characteristic: info.handle })
            }
            None => Err(anyhow!("No usable characteristic found")),
        }
    }

    /// Consumes payloads until the link fails or `cancel` fires. Returns the reason.
    async fn receive(&mut self, path: DataPath<T::Characteristic>, cancel: &CancellationToken) -> String {
        debug!("Receiving compass data from {}", path.uuid());
        match path {
            DataPath::Notify { mut stream, .. } => self.receive_notifications(&mut stream, cancel).await,
            DataPath::Poll { characteristic, .. } => self.poll(characteristic, cancel).await,
        }
    }

    async fn receive_notifications(
        &mut self,
        stream: &mut NotificationReceiver,
        cancel: &CancellationToken,
    ) -> String {
        let Some(peripheral) = self.session.as_ref().map(|s| s.peripheral.clone()) else {
            return "Connection lost: no active session".to_string();
        };
        let check_every = self.config.idle_interval().max(Duration::from_millis(1));
        let mut link_check = tokio::time::interval_at(tokio::time::Instant::now() + check_every, check_every);

        info!("Listening for compass notifications...");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return "Disconnected".to_string(),
                item = stream.recv() => {
                    match item {
                        Some(Ok(value)) => {
                            self.notification_handler.handle_payload(&value);
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            return format!("Connection lost: {}", e);
                        }
                        None => return "Connection lost: notification stream ended".to_string(),
                    }
                }
                _ = link_check.tick() => {
                    if !self.transport.is_connected(&peripheral).await {
                        return "Connection lost: peripheral disconnected".to_string();
                    }
                }
            }
        }
    }

    async fn poll(&mut self, characteristic: T::Characteristic, cancel: &CancellationToken) -> String {
        info!("Polling compass every {} ms", self.config.poll_interval_ms);
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return "Disconnected".to_string(),
                result = self.transport.read(&characteristic) => result,
            };
            match result {
                Ok(value) => {
                    self.notification_handler.handle_payload(&value);
                }
                Err(e) => {
                    error!("Poll error: {}", e);
                    return format!("Connection lost: {}", e);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return "Disconnected".to_string(),
                _ = sleep(self.config.poll_interval()) => {}
            }
        }
    }

    fn remember_characteristic(&mut self, characteristic: T::Characteristic) {
        if let Some(session) = self.session.as_mut() {
            session.characteristic = Some(characteristic);
        }
    }

    /// Drops the session, disconnecting best-effort.
    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.connected = false;
            info!("Releasing session with {} ({})", session.name, session.id);
            if let Err(e) = self.transport.disconnect(&session.peripheral).await {
                warn!("Disconnect error: {}", e);
            }
        }
    }
}
