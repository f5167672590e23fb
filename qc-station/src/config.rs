//! Station configuration loaded from a JSON file.
//!
//! Every section is optional; missing fields take their defaults so a
//! deployment file only needs to carry what it overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qc_core::catalog::{CatalogError, TestCatalog, TestDefinition, mic_balance_test};
use qc_core::sequencer::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const SERVICE_UUID: &str = "a07498ca-ad5b-474e-940d-16f1fbe7e8cd";
pub const COMMAND_CHARACTERISTIC_UUID: &str = "b30ac6b4-1b2d-4c2f-9c10-4b2a7b80f1a1";
pub const EVENT_CHARACTERISTIC_UUID: &str = "f29f4a3e-9a53-4d93-9b33-0a1cc4f0c8a2";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid test catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("invalid GATT {field} UUID `{value}`: {source}")]
    Uuid {
        field: &'static str,
        value: String,
        #[source]
        source: uuid::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub transport: TransportKind,
    pub orchestrator: OrchestratorConfig,
    pub tests: Vec<TestDefinition>,
    pub discovery: DiscoveryConfig,
    pub gatt: GattConfig,
    pub simulator: SimulatorConfig,
    pub storage: StorageConfig,
    pub front_end: FrontEnd,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            orchestrator: OrchestratorConfig::default(),
            tests: vec![mic_balance_test()],
            discovery: DiscoveryConfig::default(),
            gatt: GattConfig::default(),
            simulator: SimulatorConfig::default(),
            storage: StorageConfig::default(),
            front_end: FrontEnd::default(),
        }
    }
}

impl StationConfig {
    /// Loads the configuration at `path`, falling back to defaults.
    ///
    /// A missing path, an unreadable file, and a parse failure are all logged
    /// as warnings; the station always comes up with a usable configuration.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::info!("no configuration file given; using defaults");
            return Self::default();
        };

        match Self::read(path) {
            Ok(config) => {
                log::info!("loaded configuration from {}", path.display());
                config
            }
            Err(err) => {
                log::warn!("{err}; using default configuration");
                Self::default()
            }
        }
    }

    /// Reads and parses the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not a valid configuration document.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or mistyped fields.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the validated test catalog from the `tests` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Catalog`] when a definition is incomplete or
    /// duplicated.
    pub fn catalog(&self) -> Result<TestCatalog, ConfigError> {
        Ok(TestCatalog::new(self.tests.clone())?)
    }
}

/// Scan and connection pacing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// MAC address to connect to; the name heuristic applies when absent.
    pub device_address: Option<String>,
    pub scan_attempts: u32,
    pub scan_window_ms: u64,
    pub retry_delay_ms: u64,
    /// Pause between the operator's ready signal and the first scan.
    pub post_ready_delay_ms: u64,
    /// Pause after connecting so the peripheral's services settle.
    pub post_connect_delay_ms: u64,
}

impl DiscoveryConfig {
    #[must_use]
    pub const fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn post_ready_delay(&self) -> Duration {
        Duration::from_millis(self.post_ready_delay_ms)
    }

    #[must_use]
    pub const fn post_connect_delay(&self) -> Duration {
        Duration::from_millis(self.post_connect_delay_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            device_address: None,
            scan_attempts: 3,
            scan_window_ms: 7_000,
            retry_delay_ms: 2_000,
            post_ready_delay_ms: 5_000,
            post_connect_delay_ms: 1_000,
        }
    }
}

/// GATT identifiers of the QC service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GattConfig {
    pub service_uuid: String,
    pub command_uuid: String,
    pub event_uuid: String,
}

/// Parsed form of [`GattConfig`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GattUuids {
    pub service: Uuid,
    pub command: Uuid,
    pub events: Uuid,
}

impl GattConfig {
    /// Parses the configured identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Uuid`] naming the first malformed field.
    pub fn uuids(&self) -> Result<GattUuids, ConfigError> {
        let parse = |field: &'static str, value: &str| {
            Uuid::parse_str(value).map_err(|source| ConfigError::Uuid {
                field,
                value: value.to_string(),
                source,
            })
        };

        Ok(GattUuids {
            service: parse("service", &self.service_uuid)?,
            command: parse("command", &self.command_uuid)?,
            events: parse("event", &self.event_uuid)?,
        })
    }
}

impl Default for GattConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID.to_string(),
            command_uuid: COMMAND_CHARACTERISTIC_UUID.to_string(),
            event_uuid: EVENT_CHARACTERISTIC_UUID.to_string(),
        }
    }
}

/// How the simulated peripheral answers a command.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Structured `{"kind": ..., "payload": ...}` result.
    #[default]
    Json,
    /// Plain-text line from older firmware.
    Text,
    /// No reply at all.
    Silent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub device_name: String,
    pub address: String,
    pub rssi: i16,
    pub rms_left: f64,
    pub rms_right: f64,
    pub baseline_left: f64,
    pub baseline_right: f64,
    pub response_delay_ms: u64,
    /// Prompt sent shortly after a command arrives.
    pub instruction: Option<String>,
    pub instruction_waits: bool,
    pub mode: ReplyMode,
    pub text_reply: String,
    pub duplicate_responses: bool,
    pub fail_writes: bool,
    pub fail_connect: bool,
    /// Number of scans that miss the device before it starts advertising.
    pub visible_after_scans: u32,
}

impl SimulatorConfig {
    #[must_use]
    pub const fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_name: "DINO-QA-01".to_string(),
            address: "24:6F:28:AA:BB:CC".to_string(),
            rssi: -58,
            rms_left: 5_200.0,
            rms_right: 5_100.0,
            baseline_left: 310.0,
            baseline_right: 295.0,
            response_delay_ms: 3_000,
            instruction: None,
            instruction_waits: false,
            mode: ReplyMode::Json,
            text_reply: "PASS".to_string(),
            duplicate_responses: false,
            fail_writes: false,
            fail_connect: false,
            visible_after_scans: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub results_dir: PathBuf,
    pub transcript_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("qc_results"),
            transcript_path: None,
        }
    }
}

/// Link the station drives.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The host Bluetooth adapter.
    #[default]
    Ble,
    /// The in-process simulated peripheral.
    Simulated,
}

impl TransportKind {
    /// Parses a `--transport` value.
    ///
    /// # Errors
    ///
    /// Returns a message naming the unknown tag.
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("ble") {
            Ok(Self::Ble)
        } else if tag.eq_ignore_ascii_case("simulated") || tag.eq_ignore_ascii_case("sim") {
            Ok(Self::Simulated)
        } else {
            Err(format!("Unknown transport `{tag}`"))
        }
    }
}

/// Presentation layer rendered over the shared orchestrator.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontEnd {
    /// Verdict and progress only.
    #[default]
    Kiosk,
    /// Per-test details and the session log.
    Technician,
}

impl FrontEnd {
    /// Parses a `--front-end` value.
    ///
    /// # Errors
    ///
    /// Returns a message naming the unknown tag.
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("kiosk") {
            Ok(Self::Kiosk)
        } else if tag.eq_ignore_ascii_case("technician") || tag.eq_ignore_ascii_case("tech") {
            Ok(Self::Technician)
        } else {
            Err(format!("Unknown front-end `{tag}`"))
        }
    }
}
