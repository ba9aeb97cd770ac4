//! Game state snapshot.
//!
//! Holds the complete, immutable picture of the game that one planning pass
//! reads: players, unit types, territories with their garrisons, and the
//! units themselves. All collections are dense arrays indexed by id, and
//! every query here is a plain predicate over that snapshot.

use serde::{Deserialize, Serialize};

use super::player::{Player, PlayerId};
use super::territory::{Territory, TerritoryId};
use super::unit::{SupportRule, Unit, UnitId, UnitType, UnitTypeId};

fn default_dice_sides() -> u32 {
    6
}

/// Immutable snapshot of the game consumed by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub round: u32,
    #[serde(default = "default_dice_sides")]
    pub dice_sides: u32,
    /// Hits are `power / dice_sides` plus one fractional roll.
    #[serde(default)]
    pub low_luck: bool,
    /// Defending subs may submerge before the battle starts.
    #[serde(default)]
    pub sub_retreat_before_battle: bool,
    pub players: Vec<Player>,
    pub unit_types: Vec<UnitType>,
    #[serde(default)]
    pub support_rules: Vec<SupportRule>,
    pub territories: Vec<Territory>,
    pub units: Vec<Unit>,
    #[serde(skip)]
    locations: Vec<Option<TerritoryId>>,
}

impl GameState {
    /// Builds a state and indexes unit locations.
    pub fn new(
        players: Vec<Player>,
        unit_types: Vec<UnitType>,
        support_rules: Vec<SupportRule>,
        territories: Vec<Territory>,
        units: Vec<Unit>,
    ) -> Self {
        let mut state = GameState {
            round: 1,
            dice_sides: default_dice_sides(),
            low_luck: false,
            sub_retreat_before_battle: false,
            players,
            unit_types,
            support_rules,
            territories,
            units,
            locations: Vec::new(),
        };
        state.reindex();
        state
    }

    /// Recomputes the unit-to-territory index from the garrisons.
    pub fn reindex(&mut self) {
        self.locations = vec![None; self.units.len()];
        for t in &self.territories {
            for u in &t.units {
                if let Some(slot) = self.locations.get_mut(u.0 as usize) {
                    *slot = Some(t.id);
                }
            }
        }
    }

    pub fn territory(&self, id: TerritoryId) -> &Territory {
        &self.territories[id.index()]
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.0 as usize]
    }

    pub fn unit_type(&self, id: UnitTypeId) -> &UnitType {
        &self.unit_types[id.0 as usize]
    }

    /// Returns the type of a unit.
    pub fn type_of(&self, unit: UnitId) -> &UnitType {
        self.unit_type(self.unit(unit).kind)
    }

    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id.0 as usize]
    }

    pub fn player_by_name(&self, name: &str) -> Option<PlayerId> {
        self.players.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Territory currently holding the unit.
    pub fn location(&self, unit: UnitId) -> Option<TerritoryId> {
        self.locations.get(unit.0 as usize).copied().flatten()
    }

    pub fn territory_ids(&self) -> impl Iterator<Item = TerritoryId> + '_ {
        self.territories.iter().map(|t| t.id)
    }

    pub fn is_neutral_player(&self, player: PlayerId) -> bool {
        self.player(player).neutral
    }

    /// Players are allied when equal or sharing an alliance (neutrals ally nobody).
    pub fn is_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return true;
        }
        let (pa, pb) = (self.player(a), self.player(b));
        !pa.neutral && !pb.neutral && pa.alliance == pb.alliance
    }

    /// Players are at war when neither is neutral and they are not allied.
    pub fn is_at_war(&self, a: PlayerId, b: PlayerId) -> bool {
        !self.is_allied(a, b) && !self.is_neutral_player(a) && !self.is_neutral_player(b)
    }

    /// All non-neutral players at war with `player`.
    pub fn enemies_of(&self, player: PlayerId) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| self.is_at_war(player, p.id))
            .map(|p| p.id)
            .collect()
    }

    pub fn capital_of(&self, player: PlayerId) -> Option<TerritoryId> {
        self.territories
            .iter()
            .find(|t| t.capital_of == Some(player) && t.owner == Some(player))
            .map(|t| t.id)
    }

    /// Land that is unowned or owned by a neutral player.
    pub fn is_neutral_land(&self, t: TerritoryId) -> bool {
        let terr = self.territory(t);
        terr.is_land() && terr.owner.map_or(true, |o| self.is_neutral_player(o))
    }

    /// Land owned by a player at war with `player`.
    pub fn is_enemy_territory(&self, t: TerritoryId, player: PlayerId) -> bool {
        let terr = self.territory(t);
        terr.is_land() && terr.owner.is_some_and(|o| self.is_at_war(player, o))
    }

    /// Land owned by `player` or an ally.
    pub fn is_allied_territory(&self, t: TerritoryId, player: PlayerId) -> bool {
        let terr = self.territory(t);
        terr.is_land() && terr.owner.is_some_and(|o| self.is_allied(player, o))
    }

    pub fn units_at(&self, t: TerritoryId) -> impl Iterator<Item = &Unit> + '_ {
        self.territory(t).units.iter().map(move |u| self.unit(*u))
    }

    /// Units in `t` owned by `player`.
    pub fn owned_units(&self, t: TerritoryId, player: PlayerId) -> Vec<UnitId> {
        self.units_at(t)
            .filter(|u| u.owner == player)
            .map(|u| u.id)
            .collect()
    }

    /// Units in `t` owned by `player` or an ally.
    pub fn allied_units(&self, t: TerritoryId, player: PlayerId) -> Vec<UnitId> {
        self.units_at(t)
            .filter(|u| self.is_allied(player, u.owner))
            .map(|u| u.id)
            .collect()
    }

    /// Units in `t` owned by players at war with `player`.
    pub fn enemy_units(&self, t: TerritoryId, player: PlayerId) -> Vec<UnitId> {
        self.units_at(t)
            .filter(|u| self.is_at_war(player, u.owner))
            .map(|u| u.id)
            .collect()
    }

    /// Units that would defend `t` against an attack by `attacker`.
    ///
    /// Includes neutral garrisons, which fight when their territory is invaded.
    pub fn defending_units(&self, t: TerritoryId, attacker: PlayerId) -> Vec<UnitId> {
        self.units_at(t)
            .filter(|u| !self.is_allied(attacker, u.owner))
            .map(|u| u.id)
            .collect()
    }

    pub fn has_enemy_units(&self, t: TerritoryId, player: PlayerId) -> bool {
        self.units_at(t).any(|u| self.is_at_war(player, u.owner))
    }

    /// Enemy combat units that block sea movement.
    pub fn has_enemy_sea_combatants(&self, t: TerritoryId, player: PlayerId) -> bool {
        self.units_at(t).any(|u| {
            let ut = self.unit_type(u.kind);
            self.is_at_war(player, u.owner)
                && ut.is_sea()
                && !ut.capabilities.sub
                && (ut.attack > 0 || ut.defense > 0)
        })
    }

    pub fn has_enemy_anti_air(&self, t: TerritoryId, player: PlayerId) -> bool {
        self.units_at(t)
            .any(|u| self.is_at_war(player, u.owner) && self.unit_type(u.kind).is_anti_air())
    }

    /// Whether an owned or allied production facility stands in `t`.
    pub fn has_factory(&self, t: TerritoryId) -> bool {
        let owner = self.territory(t).owner;
        self.units_at(t).any(|u| {
            self.unit_type(u.kind).capabilities.factory
                && owner.is_some_and(|o| self.is_allied(o, u.owner))
        })
    }

    /// Free carrier deck space of `player` and allies in `t`.
    pub fn carrier_free_capacity(&self, t: TerritoryId, player: PlayerId) -> u32 {
        let mut capacity = 0u32;
        let mut used = 0u32;
        for u in self.units_at(t) {
            if !self.is_allied(player, u.owner) {
                continue;
            }
            let ut = self.unit_type(u.kind);
            capacity += ut.carrier_capacity;
            if ut.is_air() {
                used += ut.carrier_cost;
            }
        }
        capacity.saturating_sub(used)
    }

    /// Movement the unit still has this turn.
    pub fn movement_left(&self, unit: UnitId) -> u32 {
        let u = self.unit(unit);
        self.unit_type(u.kind).movement.saturating_sub(u.moved)
    }

    /// TUV of a single unit.
    pub fn unit_value(&self, unit: UnitId) -> f64 {
        self.type_of(unit).cost as f64
    }

    /// Total TUV of a unit collection.
    pub fn tuv(&self, units: &[UnitId]) -> f64 {
        units.iter().map(|u| self.unit_value(*u)).sum()
    }

    /// Income of `player` from owned territories.
    pub fn income(&self, player: PlayerId) -> u32 {
        self.territories
            .iter()
            .filter(|t| t.owner == Some(player))
            .map(|t| t.production)
            .sum()
    }

    /// Copy of the state with fresh units of `owner` standing in the given
    /// territories, plus the ids they received. Used for what-if checks of
    /// units that are only planned, never on the board.
    pub fn with_added_units(
        &self,
        owner: PlayerId,
        additions: &[(UnitTypeId, TerritoryId)],
    ) -> (GameState, Vec<UnitId>) {
        let mut state = self.clone();
        let mut ids = Vec::with_capacity(additions.len());
        for &(kind, t) in additions {
            let id = UnitId(state.units.len() as u32);
            state.units.push(Unit {
                id,
                owner,
                kind,
                damage: 0,
                // Placed units do not move this turn
                moved: state.unit_type(kind).movement,
                transported_by: None,
            });
            state.territories[t.index()].units.push(id);
            ids.push(id);
        }
        state.reindex();
        (state, ids)
    }

    /// Cargo currently carried by a transport.
    pub fn cargo_of(&self, transport: UnitId) -> Vec<UnitId> {
        match self.location(transport) {
            Some(t) => self
                .units_at(t)
                .filter(|u| u.transported_by == Some(transport))
                .map(|u| u.id)
                .collect(),
            None => Vec::new(),
        }
    }
}
