//! Operator console tooling shared by the kiosk and technician front-ends.
//!
//! The line grammar lives in [`grammar`] and is built from `winnow`
//! combinators over the command table in [`catalog`].

pub mod catalog;
pub mod grammar;
pub mod status;

pub use grammar::{ConsoleCommand, ParseError, parse};
pub use status::StatusFormatter;
