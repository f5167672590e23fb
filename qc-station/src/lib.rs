// Host station for the BLE QC test orchestrator: tokio driver, transports,
// persistence and the operator console built on `qc-core`.

pub mod config;
pub mod console;
pub mod discovery;
pub mod driver;
pub mod instant;
pub mod persistence;
pub mod transport;

pub use config::StationConfig;
pub use driver::{Orchestrator, OrchestratorError, SessionSnapshot};
