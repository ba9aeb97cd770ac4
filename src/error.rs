//! Error types surfaced by the planning core.
//!
//! Only contract breaches by callers and cancellation are errors. Targets
//! that cannot be taken, exhausted budgets, and unroutable units are normal
//! planning outcomes and never reach this type.

use crate::board::{PlayerId, TerritoryId, UnitId, UnitTypeId};
use crate::protocol::scenario::SnapshotError;

/// Errors returned from `ProAiEngine` entry points.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("casualty mismatch: {requested} hits requested, default selection has {provided}")]
    CasualtyCountMismatch { requested: usize, provided: usize },

    #[error("unknown territory {0:?}")]
    UnknownTerritory(TerritoryId),

    #[error("unknown unit {0:?}")]
    UnknownUnit(UnitId),

    #[error("unknown unit type {0:?}")]
    UnknownUnitType(UnitTypeId),

    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),

    #[error("planning cancelled")]
    Cancelled,

    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}
