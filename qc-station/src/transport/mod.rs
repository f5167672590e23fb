//! Peripheral transport abstraction.
//!
//! A [`Transport`] owns at most one connection. Notifications are pushed into
//! whichever [`EventSubscription`] is currently registered with the
//! transport's [`EventSink`]; dropping the subscription deregisters it, after
//! which the transport discards notifications instead of queueing them.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

pub mod ble;
pub mod simulated;

pub use ble::BlePeripheral;
pub use simulated::SimulatedPeripheral;

/// Notifications buffered between the transport and the driver.
pub const NOTIFICATION_QUEUE_DEPTH: usize = 32;

/// Advertisement seen during a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertised GATT service UUIDs.
    pub services: Vec<String>,
}

impl DiscoveredDevice {
    /// Name for logs; falls back to `Unknown` like the scanner does.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to a device")]
    NotConnected,
    #[error("already connected to {0}")]
    AlreadyConnected(String),
    #[error("connection to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },
    #[error("write to command characteristic failed: {0}")]
    WriteFailed(String),
    #[error("scan failed: {0}")]
    ScanFailed(String),
}

/// Connection to one BLE peripheral.
pub trait Transport: Send {
    /// Scans for advertising peripherals for `window`.
    fn scan(
        &mut self,
        window: Duration,
    ) -> impl Future<Output = Result<Vec<DiscoveredDevice>, TransportError>> + Send;

    fn connect(
        &mut self,
        device: &DiscoveredDevice,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Writes one encoded command to the control characteristic.
    fn send(&mut self, bytes: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Registers a fresh event sink, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] without an open connection.
    fn subscribe(&mut self) -> Result<EventSubscription, TransportError>;

    /// Closes the connection; calling it while disconnected is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    fn is_connected(&self) -> bool;

    /// Returns `true` while an [`EventSubscription`] is registered.
    fn has_event_sink(&self) -> bool;
}

type Registered = Option<(u64, mpsc::Sender<Vec<u8>>)>;

/// Shared slot holding the registered notification sender.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    slot: Arc<Mutex<Registered>>,
    next_id: Arc<AtomicU64>,
}

impl EventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscription, replacing the previous one.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::channel(NOTIFICATION_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *lock(&self.slot) = Some((id, sender));
        EventSubscription {
            id,
            receiver,
            slot: Arc::clone(&self.slot),
        }
    }

    /// Pushes a notification to the registered subscription.
    ///
    /// Returns `false` when nobody is subscribed or the queue is full; the
    /// notification is dropped in both cases.
    pub fn deliver(&self, bytes: Vec<u8>) -> bool {
        let slot = lock(&self.slot);
        let Some((_, sender)) = slot.as_ref() else {
            log::debug!("discarding {} byte notification: no subscriber", bytes.len());
            return false;
        };

        match sender.try_send(bytes) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(bytes)) => {
                log::warn!(
                    "notification queue full; dropping {} byte notification",
                    bytes.len()
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Deregisters whichever subscription is current.
    pub fn clear(&self) {
        *lock(&self.slot) = None;
    }
}

/// Receiving end of a registered event sink.
#[derive(Debug)]
pub struct EventSubscription {
    id: u64,
    receiver: mpsc::Receiver<Vec<u8>>,
    slot: Arc<Mutex<Registered>>,
}

impl EventSubscription {
    /// Waits for the next notification; `None` once the sink is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *slot = None;
        }
    }
}

fn lock(slot: &Mutex<Registered>) -> MutexGuard<'_, Registered> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
