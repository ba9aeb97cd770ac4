//! Board representation and game-state types.
//!
//! Contains the immutable snapshot structures for players, territories,
//! unit types, and units, plus routing and distance queries over the map.

pub mod builder;
pub mod player;
pub mod routes;
pub mod state;
pub mod territory;
pub mod unit;

pub use builder::StateBuilder;
pub use player::{Player, PlayerId, ProductionRule};
pub use routes::{find_route, reachable_within, DistanceMatrix, Distances, Reach, Route};
pub use state::GameState;
pub use territory::{Edge, Terrain, Territory, TerritoryId};
pub use unit::{
    Capabilities, Domain, SupportKind, SupportRule, Unit, UnitId, UnitType, UnitTypeId,
};
