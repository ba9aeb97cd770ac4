//! Pro AI engine library.
//!
//! Plans combat moves, non-combat moves, purchases, placements, and
//! battle-time decisions for a computer player of a turn-based territorial
//! conquest wargame. Exposes the board snapshot types, the planners, the
//! rules-engine collaborator, and the protocol used by the binary.

pub mod attack;
pub mod battle;
pub mod board;
pub mod context;
pub mod decisions;
pub mod defense;
pub mod engine;
pub mod error;
pub mod eval;
pub mod observer;
pub mod options;
pub mod protocol;
pub mod purchase;
pub mod rules;

pub use context::{EngineConfig, PlanningContext};
pub use engine::{CancelToken, ProAiEngine};
pub use error::EngineError;
