//! Host protocol.
//!
//! Scenario JSON decoding and validation, the line command parser, and the
//! session that drives the engine for the binary.

pub mod parser;
pub mod scenario;
pub mod session;

pub use parser::{parse_command, Command, GoPhase};
pub use scenario::{load_scenario, save_scenario, SnapshotError};
pub use session::Session;
