// Shared logic for the BLE quality-control station.
//
// Everything in this crate is sans-IO: callers feed in instants, notification
// bytes, and operator input, and execute the returned actions against a real
// transport. The host station and the test suites drive the same state
// machine.

pub mod catalog;
pub mod clock;
pub mod console;
pub mod correlator;
pub mod evaluator;
pub mod protocol;
pub mod results;
pub mod sequencer;
pub mod session_log;
pub mod timeout;
