//! Unit types, unit instances, and support rules.
//!
//! Unit types carry every combat and movement statistic the planner reads.
//! Units are lightweight value records pointing at their type by id; the
//! planner never creates or destroys them, it only proposes moves.

use serde::{Deserialize, Serialize};

use super::player::PlayerId;

/// Dense index of a unit inside `GameState::units`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

/// Dense index of a unit type inside `GameState::unit_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitTypeId(pub u16);

/// Which terrain a unit type moves and fights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Land,
    Sea,
    Air,
}

/// Boolean capability flags of a unit type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Land unit that may pass through one empty territory on its way to a target.
    pub blitz: bool,
    /// Submerged sea unit: first strike, cannot hit air.
    pub sub: bool,
    /// Cancels enemy sub first strike and lets air hit subs.
    pub destroyer: bool,
    /// Non-combat structure; never fights and is never taken as a casualty.
    pub infrastructure: bool,
    /// Production facility; a territory holding one can receive purchases.
    pub factory: bool,
    /// Air base allowing adjacent scrambles.
    pub air_base: bool,
    /// Air unit that may scramble from an air base.
    pub can_scramble: bool,
}

/// Static definition of a unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitType {
    pub id: UnitTypeId,
    pub name: String,
    pub domain: Domain,
    pub movement: u32,
    pub attack: u32,
    pub defense: u32,
    pub attack_rolls: u32,
    pub defense_rolls: u32,
    pub hit_points: u32,
    /// Value of the unit in TUV terms.
    pub cost: u32,
    /// Cargo space this unit provides as a transport.
    pub transport_capacity: u32,
    /// Cargo space this unit occupies on a transport (0 = not transportable).
    pub transport_cost: u32,
    pub carrier_capacity: u32,
    pub carrier_cost: u32,
    /// Extra attack when landing from a transport.
    pub marine_bonus: u32,
    /// Shore bombardment strength (0 = cannot bombard).
    pub bombard: u32,
    /// Anti-air strength against attacking air in the first round.
    pub aa_attack: u32,
    /// Anti-air shots per round (0 = not anti-air).
    pub aa_shots: u32,
    /// Number of air units an air base of this type may scramble.
    pub max_scramble: u32,
    pub capabilities: Capabilities,
}

impl Default for UnitType {
    fn default() -> Self {
        UnitType {
            id: UnitTypeId(0),
            name: String::new(),
            domain: Domain::Land,
            movement: 1,
            attack: 0,
            defense: 0,
            attack_rolls: 1,
            defense_rolls: 1,
            hit_points: 1,
            cost: 0,
            transport_capacity: 0,
            transport_cost: 0,
            carrier_capacity: 0,
            carrier_cost: 0,
            marine_bonus: 0,
            bombard: 0,
            aa_attack: 0,
            aa_shots: 0,
            max_scramble: 0,
            capabilities: Capabilities::default(),
        }
    }
}

impl UnitType {
    pub fn is_land(&self) -> bool {
        self.domain == Domain::Land
    }

    pub fn is_sea(&self) -> bool {
        self.domain == Domain::Sea
    }

    pub fn is_air(&self) -> bool {
        self.domain == Domain::Air
    }

    pub fn is_infrastructure(&self) -> bool {
        self.capabilities.infrastructure
    }

    pub fn is_transport(&self) -> bool {
        self.transport_capacity > 0
    }

    pub fn is_carrier(&self) -> bool {
        self.carrier_capacity > 0
    }

    pub fn can_land_on_carrier(&self) -> bool {
        self.is_air() && self.carrier_cost > 0
    }

    pub fn is_transportable(&self) -> bool {
        self.is_land() && self.transport_cost > 0
    }

    pub fn is_anti_air(&self) -> bool {
        self.aa_shots > 0 && self.aa_attack > 0
    }

    /// Base strength on the given side of a battle, before support.
    pub fn strength(&self, attacking: bool) -> u32 {
        if attacking {
            self.attack
        } else {
            self.defense
        }
    }

    /// Base number of dice rolled on the given side of a battle.
    pub fn rolls(&self, attacking: bool) -> u32 {
        if attacking {
            self.attack_rolls
        } else {
            self.defense_rolls
        }
    }

    /// Whether the unit fights at all on this side of a battle.
    pub fn is_combatant(&self) -> bool {
        !self.is_infrastructure()
    }
}

/// A unit on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub owner: PlayerId,
    pub kind: UnitTypeId,
    /// Hits already taken this turn.
    #[serde(default)]
    pub damage: u32,
    /// Movement already spent this turn.
    #[serde(default)]
    pub moved: u32,
    /// Transport currently carrying this unit, if any.
    #[serde(default)]
    pub transported_by: Option<UnitId>,
}

/// Whether a support rule adds strength or extra dice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportKind {
    #[default]
    Strength,
    Rolls,
}

/// A unit type granting a bonus to other friendly units in the same battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportRule {
    pub name: String,
    pub supporter: UnitTypeId,
    pub supported: Vec<UnitTypeId>,
    pub bonus: i32,
    /// Units each supporter can boost.
    #[serde(default = "one")]
    pub number: u32,
    #[serde(default)]
    pub offence: bool,
    #[serde(default)]
    pub defence: bool,
    #[serde(default)]
    pub kind: SupportKind,
}

fn one() -> u32 {
    1
}

impl SupportRule {
    /// Whether the rule applies to the given side of a battle.
    pub fn applies(&self, attacking: bool) -> bool {
        if attacking {
            self.offence
        } else {
            self.defence
        }
    }
}
