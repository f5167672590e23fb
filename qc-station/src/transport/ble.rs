//! Host Bluetooth adapter driven through `btleplug`.
//!
//! Notifications from the event characteristic are forwarded by a pump task
//! into the transport's [`EventSink`], so the driver sees the same
//! [`EventSubscription`] contract as with the simulator.

use std::collections::HashMap;
use std::time::Duration;

use btleplug::api::{
    Central as _, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt as _;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use super::{DiscoveredDevice, EventSink, EventSubscription, Transport, TransportError};
use crate::config::GattUuids;

struct Link {
    peripheral: Peripheral,
    address: String,
    command: Characteristic,
    pump: JoinHandle<()>,
}

pub struct BlePeripheral {
    uuids: GattUuids,
    adapter: Option<Adapter>,
    seen: HashMap<String, Peripheral>,
    link: Option<Link>,
    sink: EventSink,
}

impl BlePeripheral {
    #[must_use]
    pub fn new(uuids: GattUuids) -> Self {
        Self {
            uuids,
            adapter: None,
            seen: HashMap::new(),
            link: None,
            sink: EventSink::new(),
        }
    }

    async fn adapter(&mut self) -> Result<Adapter, TransportError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let manager = Manager::new()
            .await
            .map_err(|err| TransportError::ScanFailed(err.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|err| TransportError::ScanFailed(err.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ScanFailed("no Bluetooth adapter found".to_string()))?;

        if let Ok(info) = adapter.adapter_info().await {
            log::info!("using Bluetooth adapter {info}");
        }
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    async fn open(&self, address: &str, peripheral: &Peripheral) -> Result<Link, String> {
        peripheral.connect().await.map_err(|err| err.to_string())?;
        peripheral
            .discover_services()
            .await
            .map_err(|err| err.to_string())?;

        let characteristics = peripheral.characteristics();
        let command = find_characteristic(&characteristics, self.uuids.command)
            .ok_or_else(|| format!("command characteristic {} missing", self.uuids.command))?;
        let events = find_characteristic(&characteristics, self.uuids.events)
            .ok_or_else(|| format!("event characteristic {} missing", self.uuids.events))?;

        peripheral
            .subscribe(&events)
            .await
            .map_err(|err| err.to_string())?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|err| err.to_string())?;

        let sink = self.sink.clone();
        let event_uuid = self.uuids.events;
        let pump = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == event_uuid {
                    sink.deliver(notification.value);
                }
            }
            log::debug!("notification stream closed");
        });

        Ok(Link {
            peripheral: peripheral.clone(),
            address: address.to_string(),
            command,
            pump,
        })
    }
}

impl Transport for BlePeripheral {
    async fn scan(&mut self, window: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let adapter = self.adapter().await?;
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|err| TransportError::ScanFailed(err.to_string()))?;
        sleep(window).await;
        if let Err(err) = adapter.stop_scan().await {
            log::warn!("failed to stop scan: {err}");
        }

        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|err| TransportError::ScanFailed(err.to_string()))?;

        let mut devices = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(properties)) => properties,
                Ok(None) => continue,
                Err(err) => {
                    log::debug!("skipping {}: {err}", peripheral.address());
                    continue;
                }
            };

            let device = advertised_device(
                &properties.address.to_string(),
                properties.local_name,
                properties.rssi,
                &properties.services,
            );
            self.seen.insert(device.address.clone(), peripheral);
            devices.push(device);
        }

        log::debug!("BLE scan found {} device(s)", devices.len());
        Ok(devices)
    }

    async fn connect(&mut self, device: &DiscoveredDevice) -> Result<(), TransportError> {
        if let Some(link) = &self.link {
            return Err(TransportError::AlreadyConnected(link.address.clone()));
        }

        let address = device.address.to_ascii_uppercase();
        let Some(peripheral) = self.seen.get(&address).cloned() else {
            return Err(TransportError::ConnectFailed {
                address,
                reason: "device was not seen in the last scan".to_string(),
            });
        };

        match self.open(&address, &peripheral).await {
            Ok(link) => {
                log::info!("BLE link up to {}", device.display_name());
                self.link = Some(link);
                Ok(())
            }
            Err(reason) => {
                if let Err(err) = peripheral.disconnect().await {
                    log::debug!("cleanup disconnect from {address} failed: {err}");
                }
                Err(TransportError::ConnectFailed { address, reason })
            }
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let Some(link) = &self.link else {
            return Err(TransportError::NotConnected);
        };

        link.peripheral
            .write(&link.command, bytes, WriteType::WithResponse)
            .await
            .map_err(|err| TransportError::WriteFailed(err.to_string()))
    }

    fn subscribe(&mut self) -> Result<EventSubscription, TransportError> {
        if self.link.is_none() {
            return Err(TransportError::NotConnected);
        }
        Ok(self.sink.subscribe())
    }

    async fn disconnect(&mut self) {
        self.sink.clear();
        let Some(link) = self.link.take() else {
            return;
        };

        link.pump.abort();
        match link.peripheral.disconnect().await {
            Ok(()) => log::info!("BLE link down ({})", link.address),
            Err(err) => log::warn!("disconnect from {} failed: {err}", link.address),
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn has_event_sink(&self) -> bool {
        self.sink.is_registered()
    }
}

impl Drop for BlePeripheral {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.pump.abort();
        }
    }
}

fn find_characteristic<'a>(
    characteristics: impl IntoIterator<Item = &'a Characteristic>,
    uuid: Uuid,
) -> Option<Characteristic> {
    characteristics
        .into_iter()
        .find(|characteristic| characteristic.uuid == uuid)
        .cloned()
}

/// Converts adapter properties into the scanner's view of a device.
fn advertised_device(
    address: &str,
    name: Option<String>,
    rssi: Option<i16>,
    services: &[Uuid],
) -> DiscoveredDevice {
    DiscoveredDevice {
        name: name.filter(|name| !name.trim().is_empty()),
        address: address.to_ascii_uppercase(),
        rssi,
        services: services.iter().map(Uuid::to_string).collect(),
    }
}
