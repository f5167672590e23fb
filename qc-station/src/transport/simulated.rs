//! In-process peripheral that answers QC commands like the device firmware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use qc_core::protocol::CommandEnvelope;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{DiscoveredDevice, EventSink, EventSubscription, Transport, TransportError};
use crate::config::{GattConfig, ReplyMode, SimulatorConfig};

/// Delay between receiving a command and sending its instruction prompt.
pub const INSTRUCTION_DELAY: Duration = Duration::from_millis(200);
const CONNECT_LATENCY: Duration = Duration::from_millis(300);
const SUMMARY_DELAY: Duration = Duration::from_millis(50);

/// Observation handle shared with tests and the console.
#[derive(Clone, Debug, Default)]
pub struct SimulatorHandle {
    sink: EventSink,
    connected: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<CommandEnvelope>>>,
}

impl SimulatorHandle {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn has_event_sink(&self) -> bool {
        self.sink.is_registered()
    }

    /// Commands written to the peripheral so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<CommandEnvelope> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pushes an arbitrary notification, as if the firmware sent it.
    pub fn inject(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.sink.deliver(bytes.into())
    }
}

pub struct SimulatedPeripheral {
    config: SimulatorConfig,
    gatt: GattConfig,
    handle: SimulatorHandle,
    connected_to: Option<String>,
    scans: u32,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulatedPeripheral {
    #[must_use]
    pub fn new(config: SimulatorConfig, gatt: GattConfig) -> Self {
        Self {
            config,
            gatt,
            handle: SimulatorHandle::default(),
            connected_to: None,
            scans: 0,
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }

    fn advertisement(&self) -> DiscoveredDevice {
        DiscoveredDevice {
            name: Some(self.config.device_name.clone()),
            address: self.config.address.clone(),
            rssi: Some(self.config.rssi),
            services: vec![self.gatt.service_uuid.clone()],
        }
    }

    fn abort_replies(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Transport for SimulatedPeripheral {
    async fn scan(&mut self, window: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        sleep(window).await;
        self.scans += 1;

        let mut devices = Vec::new();
        if self.scans > self.config.visible_after_scans {
            devices.push(DiscoveredDevice {
                name: Some("JBL Flip 5".to_string()),
                address: "F8:DF:15:01:02:03".to_string(),
                rssi: Some(-81),
                services: Vec::new(),
            });
            devices.push(self.advertisement());
        }
        log::debug!("scan {} found {} device(s)", self.scans, devices.len());
        Ok(devices)
    }

    async fn connect(&mut self, device: &DiscoveredDevice) -> Result<(), TransportError> {
        if let Some(address) = &self.connected_to {
            return Err(TransportError::AlreadyConnected(address.clone()));
        }

        sleep(CONNECT_LATENCY).await;
        if self.config.fail_connect || !device.address.eq_ignore_ascii_case(&self.config.address) {
            return Err(TransportError::ConnectFailed {
                address: device.address.clone(),
                reason: "peripheral did not accept the connection".to_string(),
            });
        }

        self.connected_to = Some(device.address.clone());
        self.handle.connected.store(true, Ordering::Release);
        log::info!("simulated link up to {}", device.display_name());
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.connected_to.is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.config.fail_writes {
            return Err(TransportError::WriteFailed(
                "GATT write to command characteristic rejected".to_string(),
            ));
        }

        let envelope: CommandEnvelope = serde_json::from_slice(bytes)
            .map_err(|err| TransportError::WriteFailed(format!("malformed command: {err}")))?;
        self.handle
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());

        self.tasks.retain(|task| !task.is_finished());
        let reply = reply_script(self.handle.sink.clone(), self.config.clone(), envelope);
        self.tasks.push(tokio::spawn(reply));
        Ok(())
    }

    fn subscribe(&mut self) -> Result<EventSubscription, TransportError> {
        if self.connected_to.is_none() {
            return Err(TransportError::NotConnected);
        }
        Ok(self.handle.sink.subscribe())
    }

    async fn disconnect(&mut self) {
        self.abort_replies();
        self.handle.sink.clear();
        if self.connected_to.take().is_some() {
            log::info!("simulated link down");
        }
        self.handle.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected_to.is_some()
    }

    fn has_event_sink(&self) -> bool {
        self.handle.sink.is_registered()
    }
}

impl Drop for SimulatedPeripheral {
    fn drop(&mut self) {
        self.abort_replies();
    }
}

async fn reply_script(sink: EventSink, config: SimulatorConfig, envelope: CommandEnvelope) {
    let mut waited = Duration::ZERO;
    if let Some(instruction) = &config.instruction {
        sleep(INSTRUCTION_DELAY).await;
        waited = INSTRUCTION_DELAY;
        let prompt = json!({
            "type": "qa_instruction",
            "instruction": instruction,
            "wait_for_user": config.instruction_waits,
        });
        sink.deliver(prompt.to_string().into_bytes());
    }

    if config.mode == ReplyMode::Silent {
        return;
    }
    sleep(config.response_delay().saturating_sub(waited)).await;

    let reply = match config.mode {
        ReplyMode::Json => result_message(&config, &envelope).into_bytes(),
        ReplyMode::Text => config.text_reply.clone().into_bytes(),
        ReplyMode::Silent => return,
    };
    sink.deliver(reply.clone());
    if config.duplicate_responses {
        sink.deliver(reply);
    }

    if config.mode == ReplyMode::Json {
        sleep(SUMMARY_DELAY).await;
        let summary = json!({
            "type": format!("{}_summary", envelope.command),
            "id": envelope.id,
            "completed": true,
        });
        sink.deliver(summary.to_string().into_bytes());
    }
}

fn result_message(config: &SimulatorConfig, envelope: &CommandEnvelope) -> String {
    let kind = envelope
        .command
        .strip_prefix("qa_")
        .unwrap_or(&envelope.command);
    json!({
        "kind": kind,
        "payload": {
            "baseline": { "rms_L": config.baseline_left, "rms_R": config.baseline_right },
            "tone": { "rms_L": config.rms_left, "rms_R": config.rms_right },
            "detect": true,
        },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_core::catalog::mic_balance_test;
    use qc_core::protocol::CommandId;
    use serde_json::Value;

    fn peripheral(config: SimulatorConfig) -> SimulatedPeripheral {
        SimulatedPeripheral::new(config, GattConfig::default())
    }

    fn mic_command() -> Vec<u8> {
        let id = CommandId::new("qa_mic_lr_test", 1_700_000_000_000);
        CommandEnvelope::for_test(&mic_balance_test(), id)
            .encode()
            .expect("encode")
    }

    async fn connected(config: SimulatorConfig) -> SimulatedPeripheral {
        let mut peripheral = peripheral(config);
        let device = peripheral.advertisement();
        peripheral.connect(&device).await.expect("connect");
        peripheral
    }

    #[tokio::test(start_paused = true)]
    async fn device_appears_after_configured_scans() {
        let mut peripheral = peripheral(SimulatorConfig {
            visible_after_scans: 1,
            ..SimulatorConfig::default()
        });

        let first = peripheral.scan(Duration::from_secs(7)).await.expect("scan");
        assert!(first.is_empty());
        let second = peripheral.scan(Duration::from_secs(7)).await.expect("scan");
        assert!(second.iter().any(|device| device.address == "24:6F:28:AA:BB:CC"));
    }

    #[tokio::test(start_paused = true)]
    async fn answers_with_result_then_summary() {
        let mut peripheral = connected(SimulatorConfig::default()).await;
        let mut events = peripheral.subscribe().expect("subscribe");

        peripheral.send(&mic_command()).await.expect("send");

        let result: Value =
            serde_json::from_slice(&events.recv().await.expect("result")).expect("json");
        assert_eq!(result["kind"], "mic_lr_test");
        assert_eq!(result["payload"]["tone"]["rms_L"], 5_200.0);

        let summary: Value =
            serde_json::from_slice(&events.recv().await.expect("summary")).expect("json");
        assert_eq!(summary["type"], "qa_mic_lr_test_summary");
        assert_eq!(peripheral.handle().received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_and_disconnected_send() {
        let mut failing = connected(SimulatorConfig {
            fail_writes: true,
            ..SimulatorConfig::default()
        })
        .await;
        assert!(matches!(
            failing.send(&mic_command()).await,
            Err(TransportError::WriteFailed(_))
        ));

        let mut idle = peripheral(SimulatorConfig::default());
        assert!(matches!(
            idle.send(&mic_command()).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent_and_clears_sink() {
        let mut peripheral = connected(SimulatorConfig::default()).await;
        let _events = peripheral.subscribe().expect("subscribe");
        assert!(peripheral.has_event_sink());

        peripheral.disconnect().await;
        peripheral.disconnect().await;
        assert!(!peripheral.is_connected());
        assert!(!peripheral.has_event_sink());
        assert!(!peripheral.handle().inject(b"PASS".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn second_connect_is_rejected() {
        let mut peripheral = connected(SimulatorConfig::default()).await;
        let device = peripheral.advertisement();
        assert!(matches!(
            peripheral.connect(&device).await,
            Err(TransportError::AlreadyConnected(_))
        ));
    }
}
