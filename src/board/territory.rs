//! Territories and map topology.

use serde::{Deserialize, Serialize};

use super::player::PlayerId;
use super::unit::UnitId;

/// Dense index of a territory inside `GameState::territories`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerritoryId(pub u32);

impl TerritoryId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Terrain class of a territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Land,
    Water,
    Impassable,
}

/// A directed adjacency with its movement cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub to: TerritoryId,
    #[serde(default = "one")]
    pub cost: u32,
}

fn one() -> u32 {
    1
}

/// A territory of the map with its garrison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub terrain: Terrain,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Resources produced per turn by the owner.
    #[serde(default)]
    pub production: u32,
    /// Player whose capital this is.
    #[serde(default)]
    pub capital_of: Option<PlayerId>,
    /// Owner of a land territory; water is usually unowned.
    #[serde(default)]
    pub owner: Option<PlayerId>,
    #[serde(default)]
    pub units: Vec<UnitId>,
}

impl Territory {
    pub fn is_land(&self) -> bool {
        self.terrain == Terrain::Land
    }

    pub fn is_water(&self) -> bool {
        self.terrain == Terrain::Water
    }

    pub fn is_passable(&self) -> bool {
        self.terrain != Terrain::Impassable
    }

    pub fn is_capital(&self) -> bool {
        self.capital_of.is_some()
    }

    /// Iterates neighbouring territory ids.
    pub fn neighbors(&self) -> impl Iterator<Item = TerritoryId> + '_ {
        self.edges.iter().map(|e| e.to)
    }
}
