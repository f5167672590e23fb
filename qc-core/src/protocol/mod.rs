//! Wire formats exchanged with the peripheral.
//!
//! Commands travel as compact JSON envelopes on the control characteristic;
//! notifications on the event characteristic are either JSON objects or
//! free-form text lines emitted by older firmware.

pub mod decoder;
pub mod envelope;

pub use decoder::{
    InboundEvent, InstructionMessage, SummaryMessage, TestResultMessage, TextLine, TextVerdict,
    decode,
};
pub use envelope::{CommandEnvelope, CommandId};
