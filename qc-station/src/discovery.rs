//! Locating and connecting to the peripheral under test.
//!
//! After the operator signals the device is ready, the station waits for the
//! device to start advertising, scans a bounded number of times, and picks
//! the best candidate: a configured address wins outright, then a device
//! advertising the QC service, then a device whose name looks like a test
//! unit. Any named device is accepted as a last resort.

use thiserror::Error;
use tokio::time::sleep;

use crate::config::DiscoveryConfig;
use crate::transport::{DiscoveredDevice, Transport, TransportError};

const NAME_HINTS: &[&str] = &["dino", "qa", "esp", "bt"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Device not found after {attempts} attempts")]
    NotFound { attempts: u32 },
    #[error(transparent)]
    Connect(#[from] TransportError),
}

/// Progress callbacks for front-ends that narrate discovery.
pub trait DiscoveryReporter {
    fn scanning(&mut self, attempt: u32, of: u32);
    fn found(&mut self, device: &DiscoveredDevice);
}

/// Reporter that only writes to the `log` facade.
#[derive(Debug, Default)]
pub struct LogReporter;

impl DiscoveryReporter for LogReporter {
    fn scanning(&mut self, attempt: u32, of: u32) {
        log::info!("Scanning for device (attempt {attempt}/{of})");
    }

    fn found(&mut self, device: &DiscoveredDevice) {
        log::info!(
            "Found device: {} ({})",
            device.display_name(),
            device.address
        );
    }
}

/// Picks the most plausible QC target from one scan.
#[must_use]
pub fn select_device<'a>(
    devices: &'a [DiscoveredDevice],
    address: Option<&str>,
    service_uuid: &str,
) -> Option<&'a DiscoveredDevice> {
    if let Some(address) = address {
        return devices
            .iter()
            .find(|device| device.address.eq_ignore_ascii_case(address));
    }

    devices
        .iter()
        .find(|device| {
            device
                .services
                .iter()
                .any(|service| service.eq_ignore_ascii_case(service_uuid))
        })
        .or_else(|| devices.iter().find(|device| has_name_hint(device)))
        .or_else(|| {
            devices
                .iter()
                .find(|device| device.name.as_ref().is_some_and(|name| name.len() > 3))
        })
        .or_else(|| devices.first())
}

fn has_name_hint(device: &DiscoveredDevice) -> bool {
    device.name.as_ref().is_some_and(|name| {
        let lower = name.to_ascii_lowercase();
        NAME_HINTS.iter().any(|hint| lower.contains(hint))
    })
}

/// Runs the ready delay, scan loop, and connect sequence.
///
/// # Errors
///
/// Returns [`DiscoveryError::NotFound`] when no scan produced a candidate and
/// [`DiscoveryError::Connect`] when the transport refused the connection.
pub async fn connect_peripheral<T, R>(
    transport: &mut T,
    config: &DiscoveryConfig,
    service_uuid: &str,
    reporter: &mut R,
) -> Result<DiscoveredDevice, DiscoveryError>
where
    T: Transport,
    R: DiscoveryReporter + Send,
{
    sleep(config.post_ready_delay()).await;

    let attempts = config.scan_attempts.max(1);
    let mut target = None;
    for attempt in 1..=attempts {
        reporter.scanning(attempt, attempts);
        match transport.scan(config.scan_window()).await {
            Ok(devices) => {
                target = select_device(&devices, config.device_address.as_deref(), service_uuid)
                    .cloned();
            }
            Err(err) => log::warn!("scan attempt {attempt} failed: {err}"),
        }

        if target.is_some() {
            break;
        }
        if attempt < attempts {
            sleep(config.retry_delay()).await;
        }
    }

    let Some(device) = target else {
        return Err(DiscoveryError::NotFound { attempts });
    };
    reporter.found(&device);

    transport.connect(&device).await?;
    sleep(config.post_connect_delay()).await;
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: Option<&str>, address: &str, services: &[&str]) -> DiscoveredDevice {
        DiscoveredDevice {
            name: name.map(str::to_string),
            address: address.to_string(),
            rssi: None,
            services: services.iter().map(|service| (*service).to_string()).collect(),
        }
    }

    const SERVICE: &str = "a07498ca-ad5b-474e-940d-16f1fbe7e8cd";

    #[test]
    fn configured_address_matches_case_insensitively() {
        let devices = [
            device(Some("DINO-QA-01"), "24:6F:28:AA:BB:CC", &[SERVICE]),
            device(Some("Other"), "24:6F:28:00:00:01", &[]),
        ];
        let chosen = select_device(&devices, Some("24:6f:28:00:00:01"), SERVICE);
        assert_eq!(chosen.map(|d| d.address.as_str()), Some("24:6F:28:00:00:01"));
    }

    #[test]
    fn configured_address_never_falls_back() {
        let devices = [device(Some("DINO-QA-01"), "24:6F:28:AA:BB:CC", &[SERVICE])];
        assert!(select_device(&devices, Some("00:00:00:00:00:00"), SERVICE).is_none());
    }

    #[test]
    fn service_beats_name_hint() {
        let devices = [
            device(Some("ESP32-dev"), "01", &[]),
            device(None, "02", &[SERVICE]),
        ];
        let chosen = select_device(&devices, None, SERVICE);
        assert_eq!(chosen.map(|d| d.address.as_str()), Some("02"));
    }

    #[test]
    fn heuristic_prefers_hinted_names_then_long_names() {
        let devices = [
            device(Some("TV"), "01", &[]),
            device(Some("Speaker"), "02", &[]),
            device(Some("bt-module"), "03", &[]),
        ];
        assert_eq!(
            select_device(&devices, None, SERVICE).map(|d| d.address.as_str()),
            Some("03")
        );
        assert_eq!(
            select_device(&devices[..2], None, SERVICE).map(|d| d.address.as_str()),
            Some("02")
        );
        assert_eq!(
            select_device(&devices[..1], None, SERVICE).map(|d| d.address.as_str()),
            Some("01")
        );
        assert!(select_device(&[], None, SERVICE).is_none());
    }
}
