//! Incremental construction of game states.
//!
//! Used by the scenario loader's tests, the integration tests, and the
//! benches to assemble small maps without writing JSON by hand. Stock unit
//! types follow the classic conquest-game roster and are created on first
//! use, so a builder only carries the types a scenario actually needs.

use super::player::{Player, PlayerId, ProductionRule};
use super::state::GameState;
use super::territory::{Edge, Terrain, Territory, TerritoryId};
use super::unit::{
    Capabilities, Domain, SupportKind, SupportRule, Unit, UnitId, UnitType, UnitTypeId,
};

/// Mutable builder producing an indexed `GameState`.
#[derive(Debug, Default)]
pub struct StateBuilder {
    players: Vec<Player>,
    unit_types: Vec<UnitType>,
    support_rules: Vec<SupportRule>,
    territories: Vec<Territory>,
    units: Vec<Unit>,
    dice_sides: Option<u32>,
    low_luck: bool,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&mut self, name: &str, alliance: u32) -> PlayerId {
        let id = PlayerId(self.players.len() as u16);
        self.players.push(Player {
            id,
            name: name.to_string(),
            alliance,
            neutral: false,
            resources: 0,
            production: Vec::new(),
        });
        id
    }

    pub fn neutral_player(&mut self, name: &str) -> PlayerId {
        let id = self.player(name, u32::MAX);
        self.players[id.0 as usize].neutral = true;
        id
    }

    pub fn resources(&mut self, player: PlayerId, amount: u32) {
        self.players[player.0 as usize].resources = amount;
    }

    /// Adds a production rule selling `kind` at its TUV cost.
    pub fn sell(&mut self, player: PlayerId, kind: UnitTypeId) {
        let cost = self.unit_types[kind.0 as usize].cost;
        self.players[player.0 as usize].production.push(ProductionRule {
            unit_type: kind,
            cost,
            quantity: 1,
        });
    }

    /// Registers a custom unit type, assigning its id.
    pub fn unit_type(&mut self, mut t: UnitType) -> UnitTypeId {
        let id = UnitTypeId(self.unit_types.len() as u16);
        t.id = id;
        self.unit_types.push(t);
        id
    }

    pub fn support(&mut self, rule: SupportRule) {
        self.support_rules.push(rule);
    }

    pub fn dice_sides(&mut self, sides: u32) {
        self.dice_sides = Some(sides);
    }

    pub fn low_luck(&mut self, on: bool) {
        self.low_luck = on;
    }

    fn territory(
        &mut self,
        name: &str,
        terrain: Terrain,
        production: u32,
        owner: Option<PlayerId>,
    ) -> TerritoryId {
        let id = TerritoryId(self.territories.len() as u32);
        self.territories.push(Territory {
            id,
            name: name.to_string(),
            terrain,
            edges: Vec::new(),
            production,
            capital_of: None,
            owner,
            units: Vec::new(),
        });
        id
    }

    pub fn land(&mut self, name: &str, production: u32, owner: Option<PlayerId>) -> TerritoryId {
        self.territory(name, Terrain::Land, production, owner)
    }

    pub fn water(&mut self, name: &str) -> TerritoryId {
        self.territory(name, Terrain::Water, 0, None)
    }

    pub fn impassable(&mut self, name: &str) -> TerritoryId {
        self.territory(name, Terrain::Impassable, 0, None)
    }

    /// Connects two territories both ways with unit cost.
    pub fn connect(&mut self, a: TerritoryId, b: TerritoryId) {
        self.connect_with_cost(a, b, 1);
    }

    pub fn connect_with_cost(&mut self, a: TerritoryId, b: TerritoryId, cost: u32) {
        self.territories[a.index()].edges.push(Edge { to: b, cost });
        self.territories[b.index()].edges.push(Edge { to: a, cost });
    }

    pub fn capital(&mut self, t: TerritoryId, player: PlayerId) {
        self.territories[t.index()].capital_of = Some(player);
    }

    pub fn set_owner(&mut self, t: TerritoryId, owner: Option<PlayerId>) {
        self.territories[t.index()].owner = owner;
    }

    pub fn add_unit(&mut self, owner: PlayerId, kind: UnitTypeId, t: TerritoryId) -> UnitId {
        let id = UnitId(self.units.len() as u32);
        self.units.push(Unit {
            id,
            owner,
            kind,
            damage: 0,
            moved: 0,
            transported_by: None,
        });
        self.territories[t.index()].units.push(id);
        id
    }

    pub fn add_units(
        &mut self,
        owner: PlayerId,
        kind: UnitTypeId,
        t: TerritoryId,
        count: usize,
    ) -> Vec<UnitId> {
        (0..count).map(|_| self.add_unit(owner, kind, t)).collect()
    }

    /// Marks `cargo` as carried by `transport`; both must share a territory.
    pub fn load(&mut self, cargo: UnitId, transport: UnitId) {
        self.units[cargo.0 as usize].transported_by = Some(transport);
    }

    pub fn build(self) -> GameState {
        let mut state = GameState::new(
            self.players,
            self.unit_types,
            self.support_rules,
            self.territories,
            self.units,
        );
        if let Some(sides) = self.dice_sides {
            state.dice_sides = sides;
        }
        state.low_luck = self.low_luck;
        state
    }

    // Stock roster

    fn stock(&mut self, name: &str, make: impl FnOnce() -> UnitType) -> UnitTypeId {
        if let Some(t) = self.unit_types.iter().find(|t| t.name == name) {
            return t.id;
        }
        let mut t = make();
        t.name = name.to_string();
        self.unit_type(t)
    }

    pub fn infantry(&mut self) -> UnitTypeId {
        self.stock("infantry", || UnitType {
            movement: 1,
            attack: 1,
            defense: 2,
            cost: 3,
            transport_cost: 2,
            ..Default::default()
        })
    }

    /// Artillery, which also registers its +1 offence support for infantry.
    pub fn artillery(&mut self) -> UnitTypeId {
        if let Some(t) = self.unit_types.iter().find(|t| t.name == "artillery") {
            return t.id;
        }
        let infantry = self.infantry();
        let id = self.stock("artillery", || UnitType {
            movement: 1,
            attack: 2,
            defense: 2,
            cost: 4,
            transport_cost: 3,
            ..Default::default()
        });
        self.support(SupportRule {
            name: "artillery".to_string(),
            supporter: id,
            supported: vec![infantry],
            bonus: 1,
            number: 1,
            offence: true,
            defence: false,
            kind: SupportKind::Strength,
        });
        id
    }

    pub fn armour(&mut self) -> UnitTypeId {
        self.stock("armour", || UnitType {
            movement: 2,
            attack: 3,
            defense: 3,
            cost: 5,
            transport_cost: 3,
            capabilities: Capabilities {
                blitz: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn fighter(&mut self) -> UnitTypeId {
        self.stock("fighter", || UnitType {
            domain: Domain::Air,
            movement: 4,
            attack: 3,
            defense: 4,
            cost: 10,
            carrier_cost: 1,
            capabilities: Capabilities {
                can_scramble: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn bomber(&mut self) -> UnitTypeId {
        self.stock("bomber", || UnitType {
            domain: Domain::Air,
            movement: 6,
            attack: 4,
            defense: 1,
            cost: 12,
            ..Default::default()
        })
    }

    pub fn transport(&mut self) -> UnitTypeId {
        self.stock("transport", || UnitType {
            domain: Domain::Sea,
            movement: 2,
            attack: 0,
            defense: 0,
            cost: 7,
            transport_capacity: 5,
            ..Default::default()
        })
    }

    pub fn destroyer(&mut self) -> UnitTypeId {
        self.stock("destroyer", || UnitType {
            domain: Domain::Sea,
            movement: 2,
            attack: 2,
            defense: 2,
            cost: 8,
            capabilities: Capabilities {
                destroyer: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn submarine(&mut self) -> UnitTypeId {
        self.stock("submarine", || UnitType {
            domain: Domain::Sea,
            movement: 2,
            attack: 2,
            defense: 1,
            cost: 6,
            capabilities: Capabilities {
                sub: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn carrier(&mut self) -> UnitTypeId {
        self.stock("carrier", || UnitType {
            domain: Domain::Sea,
            movement: 2,
            attack: 1,
            defense: 2,
            hit_points: 2,
            cost: 14,
            carrier_capacity: 2,
            ..Default::default()
        })
    }

    pub fn battleship(&mut self) -> UnitTypeId {
        self.stock("battleship", || UnitType {
            domain: Domain::Sea,
            movement: 2,
            attack: 4,
            defense: 4,
            hit_points: 2,
            cost: 20,
            bombard: 4,
            ..Default::default()
        })
    }

    pub fn factory(&mut self) -> UnitTypeId {
        self.stock("factory", || UnitType {
            movement: 0,
            cost: 15,
            capabilities: Capabilities {
                infrastructure: true,
                factory: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn aa_gun(&mut self) -> UnitTypeId {
        self.stock("aaGun", || UnitType {
            movement: 1,
            cost: 6,
            aa_attack: 1,
            aa_shots: 3,
            transport_cost: 3,
            capabilities: Capabilities {
                infrastructure: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub fn air_base(&mut self) -> UnitTypeId {
        self.stock("airBase", || UnitType {
            movement: 0,
            cost: 15,
            max_scramble: 2,
            capabilities: Capabilities {
                infrastructure: true,
                air_base: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_types_are_created_once() {
        let mut b = StateBuilder::new();
        let a = b.infantry();
        let c = b.infantry();
        assert_eq!(a, c);
        let art = b.artillery();
        assert_ne!(a, art);
        let state = b.build();
        assert_eq!(state.unit_types.len(), 2);
        assert_eq!(state.support_rules.len(), 1);
        assert_eq!(state.support_rules[0].supported, vec![a]);
    }

    #[test]
    fn connect_is_symmetric() {
        let mut b = StateBuilder::new();
        let x = b.land("X", 1, None);
        let y = b.water("Y");
        b.connect(x, y);
        let state = b.build();
        assert_eq!(state.territory(x).neighbors().collect::<Vec<_>>(), vec![y]);
        assert_eq!(state.territory(y).neighbors().collect::<Vec<_>>(), vec![x]);
    }

    #[test]
    fn sell_uses_unit_cost() {
        let mut b = StateBuilder::new();
        let p = b.player("P", 0);
        let inf = b.infantry();
        b.sell(p, inf);
        let state = b.build();
        let rule = state.player(p).rule_for(inf).unwrap();
        assert_eq!(rule.cost, 3);
        assert_eq!(rule.quantity, 1);
    }
}
