//! Players, alliances, and production catalogues.

use serde::{Deserialize, Serialize};

use super::unit::UnitTypeId;

/// Dense index of a player inside `GameState::players`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u16);

/// One purchasable entry of a player's production catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRule {
    pub unit_type: UnitTypeId,
    pub cost: u32,
    /// Units delivered per purchase.
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

/// A faction taking part in the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Players sharing an alliance number are allied.
    pub alliance: u32,
    /// Neutral players never act and are at war with nobody.
    #[serde(default)]
    pub neutral: bool,
    /// Resources available for purchasing this turn.
    #[serde(default)]
    pub resources: u32,
    #[serde(default)]
    pub production: Vec<ProductionRule>,
}

impl Player {
    /// Returns the production rule that yields the given unit type.
    pub fn rule_for(&self, unit_type: UnitTypeId) -> Option<&ProductionRule> {
        self.production.iter().find(|r| r.unit_type == unit_type)
    }
}
