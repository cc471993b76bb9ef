//! Defines shared data structures for the Bluetooth module.

use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Receiving end of a characteristic subscription.
/// The subscription ends when the receiver is dropped or the backend closes it.
pub type NotificationReceiver = mpsc::Receiver<Result<Vec<u8>>>;

/// A device seen during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral<P> {
    /// Platform-specific unique identifier for the device
    pub id: String,
    /// The advertised name, if any
    pub name: Option<String>,
    /// The signal strength (RSSI) of the device
    pub rssi: Option<i16>,
    /// Backend handle used to connect
    pub handle: P,
}

impl<P> DiscoveredPeripheral<P> {
    pub fn new(id: String, name: Option<String>, rssi: Option<i16>, handle: P) -> Self {
        Self { id, name, rssi, handle }
    }

    /// Returns true if the advertised name contains `pattern`, ignoring case.
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.name
            .as_ref()
            .map(|name| name.to_lowercase().contains(&pattern))
            .unwrap_or(false)
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// Picks the first device whose advertised name contains `pattern`.
pub fn select_peripheral<P>(
    devices: Vec<DiscoveredPeripheral<P>>,
    pattern: &str,
) -> Option<DiscoveredPeripheral<P>> {
    devices.into_iter().find(|device| device.matches(pattern))
}

/// A GATT characteristic together with the properties the connector cares about.
#[derive(Debug, Clone)]
pub struct CharacteristicInfo<C> {
    pub uuid: Uuid,
    /// Service the characteristic belongs to
    pub service: Uuid,
    /// Notify or indicate
    pub notify: bool,
    pub read: bool,
    pub handle: C,
}

impl<C> CharacteristicInfo<C> {
    pub fn is_usable(&self) -> bool {
        self.notify || self.read
    }
}

/// Picks a fallback characteristic: the first notifying one, otherwise the first readable one.
/// Characteristics whose UUID is in `exclude` are skipped.
pub fn choose_characteristic<'a, C>(
    candidates: &'a [CharacteristicInfo<C>],
    exclude: &[Uuid],
) -> Option<&'a CharacteristicInfo<C>> {
    let eligible: Vec<&CharacteristicInfo<C>> = candidates
        .iter()
        .filter(|c| !exclude.contains(&c.uuid))
        .collect();
    eligible
        .iter()
        .copied()
        .find(|c| c.notify)
        .or_else(|| eligible.iter().copied().find(|c| c.read))
}

/// How payloads reach the connector once a session is established.
pub enum DataPath<C> {
    /// The peripheral pushes values on a subscribed characteristic
    Notify { uuid: Uuid, stream: NotificationReceiver },
    /// The connector reads the characteristic at a fixed interval
    Poll { uuid: Uuid, characteristic: C },
}

impl<C> DataPath<C> {
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Notify { uuid, .. } | Self::Poll { uuid, .. } => *uuid,
        }
    }
}

/// State of the live connection, owned by the connector only.
pub struct PeripheralSession<P, C> {
    /// Identifier of the discovered device
    pub id: String,
    pub name: String,
    pub peripheral: P,
    pub connected: bool,
    /// Last characteristic the session read from or subscribed to
    pub characteristic: Option<C>,
}

impl<P, C> PeripheralSession<P, C> {
    pub fn new(id: String, name: String, peripheral: P) -> Self {
        Self {
            id,
            name,
            peripheral,
            connected: false,
            characteristic: None,
        }
    }
}
