//! The rules-engine collaborator.
//!
//! Planning never mutates the game. Hosts apply the planner's orders
//! through a `RulesEngine`, which owns the authoritative state and may
//! reject any order. `ReferenceRules` is a plain implementation over
//! `GameState` that covers movement, purchase, and placement bookkeeping;
//! the integration tests apply whole planned turns through it.

use std::collections::{BTreeMap, BTreeSet};

use crate::attack::{MoveKind, MoveOrder};
use crate::board::{
    find_route, reachable_within, GameState, PlayerId, Route, Territory, TerritoryId, Unit, UnitId,
    UnitTypeId,
};
use crate::purchase::PurchaseCount;

/// An order the rules engine refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("move rejected: {0}")]
    Move(String),
    #[error("purchase rejected: {0}")]
    Purchase(String),
    #[error("placement rejected: {0}")]
    Placement(String),
}

/// What the planner consumes from the game.
pub trait RulesEngine {
    /// Territories `unit` could move to from `from` this turn.
    fn territories_reachable_by(&self, unit: UnitId, from: TerritoryId) -> BTreeSet<TerritoryId>;

    /// Cheapest route whose intermediate territories satisfy `passable`.
    fn route(
        &self,
        from: TerritoryId,
        to: TerritoryId,
        passable: &dyn Fn(&Territory) -> bool,
    ) -> Option<Route>;

    /// Moves units along `route`. Cargo aboard a moving transport goes with
    /// it; cargo may leave its transport by a single step onto land.
    fn apply_move(&mut self, units: &[UnitId], route: &Route) -> Result<(), RulesError>;

    /// Boards land units onto `transport`, waiting in the sea zone `route`
    /// ends in.
    fn apply_load(
        &mut self,
        units: &[UnitId],
        route: &Route,
        transport: UnitId,
    ) -> Result<(), RulesError>;

    fn apply_purchase(
        &mut self,
        player: PlayerId,
        purchases: &[PurchaseCount],
    ) -> Result<(), RulesError>;

    fn apply_placement(
        &mut self,
        player: PlayerId,
        units: &[UnitTypeId],
        territory: TerritoryId,
    ) -> Result<(), RulesError>;

    fn current_game_state(&self) -> &GameState;
}

/// Hands one planned order to `rules`, boarding orders through `apply_load`.
pub fn execute<R: RulesEngine + ?Sized>(
    rules: &mut R,
    order: &MoveOrder,
) -> Result<(), RulesError> {
    match order.kind {
        MoveKind::Load { transport } => rules.apply_load(&order.units, &order.route, transport),
        _ => rules.apply_move(&order.units, &order.route),
    }
}

/// Rules over an owned `GameState`.
///
/// Moves check adjacency, movement points, and domain; land units ending in
/// undefended enemy land capture it. Purchased units wait in a per-player
/// pool until placed at a factory, at most its production value per turn.
#[derive(Debug, Clone)]
pub struct ReferenceRules {
    state: GameState,
    unplaced: BTreeMap<PlayerId, Vec<UnitTypeId>>,
    placed: BTreeMap<TerritoryId, u32>,
}

impl ReferenceRules {
    pub fn new(state: GameState) -> Self {
        ReferenceRules {
            state,
            unplaced: BTreeMap::new(),
            placed: BTreeMap::new(),
        }
    }

    /// Purchased units of `player` still waiting for placement.
    pub fn unplaced(&self, player: PlayerId) -> &[UnitTypeId] {
        self.unplaced.get(&player).map_or(&[], |v| v.as_slice())
    }

    /// Clears per-turn movement and placement counters.
    pub fn end_turn(&mut self) {
        for unit in &mut self.state.units {
            unit.moved = 0;
        }
        self.placed.clear();
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    fn passable_for(&self, unit: UnitId) -> impl Fn(&Territory) -> bool + '_ {
        let state = &self.state;
        let owner = state.unit(unit).owner;
        let ut = state.type_of(unit);
        let (air, sea) = (ut.is_air(), ut.is_sea());
        move |t: &Territory| {
            if air {
                t.is_passable()
            } else if sea {
                t.is_water() && !state.has_enemy_sea_combatants(t.id, owner)
            } else {
                t.is_land() && !state.has_enemy_units(t.id, owner) && !state.is_neutral_land(t.id)
            }
        }
    }

    fn check_move(&self, units: &[UnitId], route: &Route) -> Result<(), RulesError> {
        let state = &self.state;
        let reject = |why: String| Err(RulesError::Move(why));
        if units.is_empty() {
            return reject("no units".into());
        }
        let mut at = route.start;
        let mut cost = 0;
        for &step in &route.steps {
            if step.index() >= state.territories.len() {
                return reject(format!("unknown territory {step:?}"));
            }
            match state.territory(at).edges.iter().find(|e| e.to == step) {
                Some(edge) => cost += edge.cost,
                None => return reject(format!("{at:?} does not border {step:?}")),
            }
            at = step;
        }
        let end = state.territory(route.end());
        for &u in units {
            if u.0 as usize >= state.units.len() {
                return reject(format!("unknown unit {u:?}"));
            }
            if state.location(u) != Some(route.start) {
                return reject(format!("{u:?} is not in {:?}", route.start));
            }
            let cargo = state.unit(u).transported_by.is_some();
            let unloading =
                route.len() == 1 && state.territory(route.start).is_water() && end.is_land();
            if cargo && !unloading {
                return reject(format!("{u:?} is cargo and moves with its transport"));
            }
            if !cargo && state.movement_left(u) < cost {
                return reject(format!("{u:?} lacks movement for cost {cost}"));
            }
            let passable = self.passable_for(u);
            let blocked = route.intermediate().iter().find(|t| !passable(state.territory(**t)));
            if let Some(bad) = blocked {
                return reject(format!("{u:?} cannot pass {bad:?}"));
            }
            let ut = state.type_of(u);
            if (ut.is_sea() && !end.is_water()) || (ut.is_land() && !end.is_land()) {
                return reject(format!("{u:?} cannot end in {}", end.name));
            }
        }
        Ok(())
    }

    fn relocate(&mut self, unit: UnitId, from: TerritoryId, to: TerritoryId) {
        self.state.territories[from.index()].units.retain(|u| *u != unit);
        self.state.territories[to.index()].units.push(unit);
    }
}

impl RulesEngine for ReferenceRules {
    fn territories_reachable_by(&self, unit: UnitId, from: TerritoryId) -> BTreeSet<TerritoryId> {
        if unit.0 as usize >= self.state.units.len() {
            return BTreeSet::new();
        }
        let ut = self.state.type_of(unit);
        let passable = self.passable_for(unit);
        reachable_within(&self.state, from, self.state.movement_left(unit), passable)
            .into_keys()
            .filter(|t| {
                let terr = self.state.territory(*t);
                !((ut.is_sea() && terr.is_land()) || (ut.is_land() && terr.is_water()))
            })
            .collect()
    }

    fn route(
        &self,
        from: TerritoryId,
        to: TerritoryId,
        passable: &dyn Fn(&Territory) -> bool,
    ) -> Option<Route> {
        find_route(&self.state, from, to, passable)
    }

    fn apply_move(&mut self, units: &[UnitId], route: &Route) -> Result<(), RulesError> {
        self.check_move(units, route)?;
        let (from, to) = (route.start, route.end());
        for &u in units {
            let cargo = self.state.cargo_of(u);
            self.relocate(u, from, to);
            let movement = self.state.type_of(u).movement;
            let unit = &mut self.state.units[u.0 as usize];
            if unit.transported_by.take().is_some() {
                unit.moved = movement;
            } else {
                unit.moved += route.cost;
            }
            for c in cargo {
                self.relocate(c, from, to);
            }
        }
        self.state.reindex();

        let mover = self.state.unit(units[0]).owner;
        let lands = units.iter().any(|u| self.state.type_of(*u).is_land());
        let terr = self.state.territory(to);
        if lands
            && terr.is_land()
            && self.state.is_enemy_territory(to, mover)
            && !self.state.has_enemy_units(to, mover)
        {
            self.state.territories[to.index()].owner = Some(mover);
        }
        Ok(())
    }

    fn apply_load(
        &mut self,
        units: &[UnitId],
        route: &Route,
        transport: UnitId,
    ) -> Result<(), RulesError> {
        let state = &self.state;
        let reject = |why: String| Err(RulesError::Move(why));
        if transport.0 as usize >= state.units.len() || !state.type_of(transport).is_transport() {
            return reject(format!("{transport:?} is not a transport"));
        }
        let sea = route.end();
        if route.len() != 1
            || state.location(transport) != Some(sea)
            || !state.territory(sea).is_water()
        {
            return reject(format!("{transport:?} is not waiting one step from {:?}", route.start));
        }
        let Some(edge) = state.territory(route.start).edges.iter().find(|e| e.to == sea) else {
            return reject(format!("{:?} does not border {sea:?}", route.start));
        };
        let owner = state.unit(transport).owner;
        let mut load: u32 =
            state.cargo_of(transport).iter().map(|c| state.type_of(*c).transport_cost).sum();
        for &u in units {
            if u.0 as usize >= state.units.len() {
                return reject(format!("unknown unit {u:?}"));
            }
            let ut = state.type_of(u);
            if state.unit(u).owner != owner || !ut.is_land() || !ut.is_transportable() {
                return reject(format!("{u:?} cannot board {transport:?}"));
            }
            if state.location(u) != Some(route.start) || state.unit(u).transported_by.is_some() {
                return reject(format!("{u:?} is not ashore in {:?}", route.start));
            }
            if state.movement_left(u) < edge.cost {
                return reject(format!("{u:?} lacks movement to board"));
            }
            load += ut.transport_cost;
        }
        if load > state.type_of(transport).transport_capacity {
            return reject(format!("{transport:?} cannot carry {load}"));
        }

        let cost = edge.cost;
        for &u in units {
            self.relocate(u, route.start, sea);
            let unit = &mut self.state.units[u.0 as usize];
            unit.transported_by = Some(transport);
            unit.moved += cost;
        }
        self.state.reindex();
        Ok(())
    }

    fn apply_purchase(
        &mut self,
        player: PlayerId,
        purchases: &[PurchaseCount],
    ) -> Result<(), RulesError> {
        if player.0 as usize >= self.state.players.len() {
            return Err(RulesError::Purchase(format!("unknown player {player:?}")));
        }
        let sells = &self.state.player(player).production;
        let mut total = 0;
        for p in purchases {
            let Some(rule) = sells.iter().find(|r| r.unit_type == p.unit_type) else {
                return Err(RulesError::Purchase(format!("{} is not for sale", p.name)));
            };
            total += rule.cost * p.count;
        }
        let resources = self.state.player(player).resources;
        if total > resources {
            return Err(RulesError::Purchase(format!("costs {total}, only {resources} available")));
        }
        let pool = self.unplaced.entry(player).or_default();
        for p in purchases {
            pool.extend(std::iter::repeat(p.unit_type).take(p.units as usize));
        }
        self.state.players[player.0 as usize].resources -= total;
        Ok(())
    }

    fn apply_placement(
        &mut self,
        player: PlayerId,
        units: &[UnitTypeId],
        territory: TerritoryId,
    ) -> Result<(), RulesError> {
        let state = &self.state;
        let reject = |why: String| Err(RulesError::Placement(why));
        if territory.index() >= state.territories.len() {
            return reject(format!("unknown territory {territory:?}"));
        }
        let terr = state.territory(territory);
        let mut pool = self.unplaced(player).to_vec();
        for kind in units {
            match pool.iter().position(|k| k == kind) {
                Some(i) => {
                    pool.remove(i);
                }
                None => return reject(format!("{kind:?} was not purchased")),
            }
        }

        let (factories, others): (Vec<UnitTypeId>, Vec<UnitTypeId>) =
            units.iter().partition(|k| state.unit_type(**k).capabilities.factory);
        let foreign_site =
            terr.owner != Some(player) || !terr.is_land() || state.has_factory(territory);
        if !factories.is_empty() && foreign_site {
            return reject(format!("no factory can be built in {}", terr.name));
        }
        if !others.is_empty() {
            let factory = if terr.is_land() {
                (terr.owner == Some(player) && state.has_factory(territory)).then_some(territory)
            } else {
                terr.neighbors()
                    .find(|n| state.territory(*n).owner == Some(player) && state.has_factory(*n))
            };
            let Some(factory) = factory else {
                return reject(format!("no factory of ours can place into {}", terr.name));
            };
            let used = self.placed.get(&factory).copied().unwrap_or(0);
            if used + others.len() as u32 > state.territory(factory).production {
                let name = &state.territory(factory).name;
                return reject(format!("{name} cannot place {} more", others.len()));
            }
            if let Some(k) = others.iter().find(|k| {
                let ut = state.unit_type(**k);
                (ut.is_sea() && terr.is_land()) || (ut.is_land() && terr.is_water())
            }) {
                let name = &state.unit_type(*k).name;
                return reject(format!("{name} cannot stand in {}", terr.name));
            }
            *self.placed.entry(factory).or_insert(0) += others.len() as u32;
        }

        for &kind in units {
            let id = UnitId(self.state.units.len() as u32);
            let movement = self.state.unit_type(kind).movement;
            self.state.units.push(Unit {
                id,
                owner: player,
                kind,
                damage: 0,
                moved: movement,
                transported_by: None,
            });
            self.state.territories[territory.index()].units.push(id);
        }
        self.unplaced.insert(player, pool);
        self.state.reindex();
        Ok(())
    }

    fn current_game_state(&self) -> &GameState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateBuilder;

    fn board() -> (GameState, PlayerId, TerritoryId, TerritoryId, UnitTypeId, UnitTypeId) {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let fac = b.factory();
        b.sell(red, inf);
        b.resources(red, 10);
        let home = b.land("Home", 2, Some(red));
        let away = b.land("Away", 1, Some(blue));
        b.connect(home, away);
        b.add_unit(red, fac, home);
        b.add_units(red, inf, home, 2);
        (b.build(), red, home, away, inf, fac)
    }

    #[test]
    fn land_move_captures_empty_territory() {
        let (state, red, home, away, _, _) = board();
        let mover = state
            .owned_units(home, red)
            .into_iter()
            .find(|u| !state.type_of(*u).is_infrastructure())
            .unwrap();
        let mut rules = ReferenceRules::new(state);
        let route = rules.route(home, away, &|_| true).unwrap();
        rules.apply_move(&[mover], &route).unwrap();
        let state = rules.current_game_state();
        assert_eq!(state.location(mover), Some(away));
        assert_eq!(state.territory(away).owner, Some(red));
        assert!(rules.apply_move(&[mover], &route).is_err());
    }

    #[test]
    fn cargo_boards_sails_and_lands() {
        // Home - Near - Far - Island(enemy, empty)
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let tr = b.transport();
        let home = b.land("Home", 1, Some(red));
        let near = b.water("Near");
        let far = b.water("Far");
        let island = b.land("Island", 1, Some(blue));
        b.connect(home, near);
        b.connect(near, far);
        b.connect(far, island);
        let transport = b.add_unit(red, tr, near);
        let walker = b.add_unit(red, inf, home);
        let mut rules = ReferenceRules::new(b.build());

        let board = Route {
            start: home,
            steps: vec![near],
            cost: 1,
        };
        assert!(rules.apply_move(&[walker], &board).is_err());
        rules.apply_load(&[walker], &board, transport).unwrap();
        assert_eq!(rules.current_game_state().unit(walker).transported_by, Some(transport));

        let sail = Route {
            start: near,
            steps: vec![far],
            cost: 1,
        };
        assert!(rules.apply_move(&[walker], &sail).is_err());
        rules.apply_move(&[transport], &sail).unwrap();
        assert_eq!(rules.current_game_state().location(walker), Some(far));

        let land = Route {
            start: far,
            steps: vec![island],
            cost: 1,
        };
        rules.apply_move(&[walker], &land).unwrap();
        let state = rules.current_game_state();
        assert_eq!(state.location(walker), Some(island));
        assert_eq!(state.unit(walker).transported_by, None);
        assert_eq!(state.territory(island).owner, Some(red));
    }

    #[test]
    fn purchase_spends_resources_and_placement_respects_capacity() {
        let (state, red, home, _, inf, _) = board();
        let mut rules = ReferenceRules::new(state);
        let buy = PurchaseCount {
            unit_type: inf,
            name: "infantry".into(),
            count: 3,
            units: 3,
            cost: 9,
        };
        rules.apply_purchase(red, &[buy.clone()]).unwrap();
        assert_eq!(rules.current_game_state().player(red).resources, 1);
        assert!(rules.apply_purchase(red, &[buy]).is_err());

        assert!(rules.apply_placement(red, &[inf, inf, inf], home).is_err());
        rules.apply_placement(red, &[inf, inf], home).unwrap();
        assert_eq!(rules.unplaced(red), &[inf]);
        assert!(rules.apply_placement(red, &[inf], home).is_err());
    }
}
