//! Move orders: the planner's output handed back to the host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::{find_route, GameState, Route, TerritoryId, UnitId};
use crate::context::PlanningContext;

use super::AttackPlanner;

/// Why a group of units moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Attack,
    /// Land units boarding `transport` in the sea zone the route ends in.
    Load { transport: UnitId },
    /// A transport leg toward its unload zone; cargo aboard moves with it.
    Amphibious { transport: UnitId },
    /// Cargo of `transport` landing from its sea zone into the target.
    Unload { transport: UnitId },
    /// A ship moving to the sea zone it bombards `target` from.
    Bombard { target: TerritoryId },
    Reposition,
    Reinforce,
}

/// Units moving together along one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOrder {
    pub units: Vec<UnitId>,
    pub route: Route,
    pub kind: MoveKind,
}

/// Cheapest legal route for `unit` to `to` within its remaining movement.
///
/// Air avoids enemy anti-air where it can, sea avoids enemy warships, and
/// land never passes through enemy or neutral territory.
pub fn unit_route(ctx: &PlanningContext, unit: UnitId, to: TerritoryId) -> Option<Route> {
    let state = ctx.state;
    let player = ctx.player;
    let from = state.location(unit)?;
    let ut = state.type_of(unit);
    let route = if ut.is_air() {
        find_route(state, from, to, |x| x.is_passable() && !state.has_enemy_anti_air(x.id, player))
            .or_else(|| find_route(state, from, to, |x| x.is_passable()))
    } else if ut.is_sea() {
        find_route(
            state,
            from,
            to,
            |x| x.is_water() && !state.has_enemy_sea_combatants(x.id, player),
        )
    } else {
        find_route(state, from, to, |x| {
            x.is_land() && !state.has_enemy_units(x.id, player) && !state.is_neutral_land(x.id)
        })
    }?;
    (route.cost <= state.movement_left(unit)).then_some(route)
}

/// Routes each `(unit, destination)` and groups units sharing a path into
/// one order. Units without a legal route are reported and left out.
pub(crate) fn group_moves(
    ctx: &PlanningContext,
    moves: impl IntoIterator<Item = (UnitId, TerritoryId)>,
    kind: MoveKind,
) -> Vec<MoveOrder> {
    let mut grouped: BTreeMap<(TerritoryId, Vec<TerritoryId>), (Route, Vec<UnitId>)> =
        BTreeMap::new();
    for (unit, to) in moves {
        let Some(route) = unit_route(ctx, unit, to) else {
            ctx.observer().unit_skipped(unit, "no legal route");
            continue;
        };
        grouped
            .entry((route.start, route.steps.clone()))
            .or_insert_with(|| (route, Vec::new()))
            .1
            .push(unit);
    }
    grouped
        .into_values()
        .map(|(route, units)| MoveOrder { units, route, kind })
        .collect()
}

/// The route `start` then `steps`, costed from the map's edges.
fn leg(state: &GameState, start: TerritoryId, steps: &[TerritoryId]) -> Route {
    let mut cost = 0;
    let mut at = start;
    for &step in steps {
        let edge = state.territory(at).edges.iter().find(|e| e.to == step);
        cost += edge.map_or(1, |e| e.cost);
        at = step;
    }
    Route {
        start,
        steps: steps.to_vec(),
        cost,
    }
}

/// One amphibious assault as executable moves, in order: the transport
/// sails its route in legs, cargo boards at the first stop bordering its
/// territory, and everything aboard lands on `target` from `unload`.
///
/// Cargo whose territory borders no stop on the route is left behind.
pub fn amphibious_orders(
    ctx: &PlanningContext,
    transport: UnitId,
    cargo: &[UnitId],
    unload: TerritoryId,
    target: TerritoryId,
) -> Vec<MoveOrder> {
    let state = ctx.state;
    let Some(route) = unit_route(ctx, transport, unload) else {
        ctx.observer().unit_skipped(transport, "no sea route to its landing");
        return Vec::new();
    };
    let stops: Vec<TerritoryId> = std::iter::once(route.start)
        .chain(route.steps.iter().copied())
        .collect();
    let aboard = state.cargo_of(transport);

    let mut boarding: BTreeMap<usize, BTreeMap<TerritoryId, Vec<UnitId>>> = BTreeMap::new();
    let mut landing = Vec::new();
    for &u in cargo {
        if aboard.contains(&u) {
            landing.push(u);
            continue;
        }
        let Some(from) = state.location(u) else {
            continue;
        };
        let borders = |sea: &TerritoryId| state.territory(from).edges.iter().any(|e| e.to == *sea);
        match stops.iter().position(borders) {
            Some(i) => {
                boarding.entry(i).or_default().entry(from).or_default().push(u);
                landing.push(u);
            }
            None => ctx.observer().unit_skipped(u, "no load point on the transport's route"),
        }
    }
    if landing.is_empty() {
        return Vec::new();
    }

    let mut orders = Vec::new();
    let mut at = 0;
    let sail = |from: usize, to: usize| MoveOrder {
        units: vec![transport],
        route: leg(state, stops[from], &stops[from + 1..=to]),
        kind: MoveKind::Amphibious { transport },
    };
    for (i, groups) in boarding {
        if i > at {
            orders.push(sail(at, i));
            at = i;
        }
        for (from, units) in groups {
            orders.push(MoveOrder {
                units,
                route: leg(state, from, &[stops[i]]),
                kind: MoveKind::Load { transport },
            });
        }
    }
    if at + 1 < stops.len() {
        orders.push(sail(at, stops.len() - 1));
    }
    orders.push(MoveOrder {
        units: landing,
        route: leg(state, unload, &[target]),
        kind: MoveKind::Unload { transport },
    });
    orders
}

impl AttackPlanner<'_, '_> {
    /// Orders for every committed attack. Direct attackers sharing a path
    /// move as one group; each transport moves with its cargo.
    pub(super) fn attack_orders(&self) -> Vec<MoveOrder> {
        let ctx = self.ctx;
        let mut orders = Vec::new();

        for t in &self.prioritized {
            let Some(opt) = self.maps.territories.get(t) else {
                continue;
            };
            orders.extend(group_moves(ctx, opt.units().iter().map(|u| (*u, *t)), MoveKind::Attack));

            for (transport, cargo) in opt.amphib_attacks() {
                let Some(unload) = opt.transport_unload_from().get(transport).copied() else {
                    continue;
                };
                orders.extend(amphibious_orders(ctx, *transport, cargo, unload, *t));
            }

            for (ship, from) in opt.bombard() {
                let Some(route) = unit_route(ctx, *ship, *from) else {
                    ctx.observer().unit_skipped(*ship, "no sea route to bombard from");
                    continue;
                };
                orders.push(MoveOrder {
                    units: vec![*ship],
                    route,
                    kind: MoveKind::Bombard { target: *t },
                });
            }
        }
        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    #[test]
    fn land_route_avoids_enemy_territory() {
        // Home - Enemy - Goal and Home - Path - Goal
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let arm = b.armour();
        let inf = b.infantry();
        let home = b.land("Home", 1, Some(red));
        let enemy = b.land("Enemy", 1, Some(blue));
        let path = b.land("Path", 1, Some(red));
        let goal = b.land("Goal", 1, Some(red));
        b.connect(home, enemy);
        b.connect(enemy, goal);
        b.connect(home, path);
        b.connect(path, goal);
        let tank = b.add_unit(red, arm, home);
        b.add_unit(blue, inf, enemy);
        let state = b.build();
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: 1, ..Default::default() },
        );

        let route = unit_route(&ctx, tank, goal).unwrap();
        assert_eq!(route.steps, vec![path, goal]);
        assert_eq!(route.cost, 2);
    }

    #[test]
    fn route_beyond_movement_is_refused() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let a = b.land("A", 1, Some(red));
        let m = b.land("M", 1, Some(red));
        let z = b.land("Z", 1, Some(red));
        b.connect(a, m);
        b.connect(m, z);
        let walker = b.add_unit(red, inf, a);
        let state = b.build();
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: 1, ..Default::default() },
        );

        assert!(unit_route(&ctx, walker, m).is_some());
        assert!(unit_route(&ctx, walker, z).is_none());
    }

    #[test]
    fn amphibious_assault_sails_boards_and_lands_in_order() {
        // Start - Pickup - Island(enemy); Home borders Pickup, Far borders only Distant
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let tr = b.transport();
        let start = b.water("Start");
        let pickup = b.water("Pickup");
        let distant = b.water("Distant");
        let home = b.land("Home", 1, Some(red));
        let far = b.land("Far", 1, Some(red));
        let island = b.land("Island", 1, Some(blue));
        b.connect(start, pickup);
        b.connect(pickup, island);
        b.connect(home, pickup);
        b.connect(far, distant);
        let transport = b.add_unit(red, tr, start);
        let walker = b.add_unit(red, inf, home);
        let stranded = b.add_unit(red, inf, far);
        b.add_unit(blue, inf, island);
        let state = b.build();
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: 1, ..Default::default() },
        );

        let orders = amphibious_orders(&ctx, transport, &[walker, stranded], pickup, island);
        let kinds: Vec<MoveKind> = orders.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MoveKind::Amphibious { transport },
                MoveKind::Load { transport },
                MoveKind::Unload { transport },
            ]
        );
        assert_eq!(orders[0].units, vec![transport]);
        assert_eq!((orders[0].route.start, orders[0].route.end()), (start, pickup));
        assert_eq!((orders[1].route.start, orders[1].route.end()), (home, pickup));
        assert_eq!(orders[2].units, vec![walker]);
        assert_eq!((orders[2].route.start, orders[2].route.end()), (pickup, island));
    }

    #[test]
    fn move_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MoveKind::Bombard { target: TerritoryId(4) }).unwrap();
        assert_eq!(json, r#"{"bombard":{"target":4}}"#);
        let json = serde_json::to_string(&MoveKind::Reposition).unwrap();
        assert_eq!(json, r#""reposition""#);
    }
}
