//! Non-combat move planning.
//!
//! Reinforces threatened land and sea in order of importance, keeps one
//! defender on every border, walks idle land units toward the front,
//! gathers the fleet off our factories, and pulls exposed air back to
//! safety.
//!
//! Only units standing where no enemy can strike are pulled away to
//! reinforce.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::attack::{group_moves, unit_route, MoveKind, MoveOrder};
use crate::battle::estimate_strength;
use crate::board::{GameState, TerritoryId, UnitId};
use crate::context::PlanningContext;
use crate::error::EngineError;
use crate::observer::PlanPhase;
use crate::options::{movable_units, EnemyAttacks};

use super::hold::{assess_allied_territories, assess_hold};

/// Output of a non-combat pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NonCombatPlan {
    pub orders: Vec<MoveOrder>,
    /// Threatened territories no reinforcement could save.
    pub cannot_hold: Vec<TerritoryId>,
}

/// How badly losing `t` would hurt: production, factories, and above all
/// the capital.
pub fn defense_priority(state: &GameState, t: TerritoryId, defender_value: f64) -> f64 {
    let terr = state.territory(t);
    let factory = if state.has_factory(t) { 1.0 } else { 0.0 };
    let capital = if terr.is_capital() { 1.0 } else { 0.0 };
    (2.0 * terr.production as f64 + 4.0 * factory + 0.5 * defender_value)
        * (1.0 + factory)
        * (1.0 + 10.0 * capital)
}

fn defensive_worth(state: &GameState, unit: UnitId) -> u32 {
    let ut = state.type_of(unit);
    ut.strength(false) * ut.rolls(false) + 2 * ut.hit_points
}

struct NonCombatPlanner<'c, 'a> {
    ctx: &'c PlanningContext<'a>,
    enemy: EnemyAttacks,
    /// Units free to move: not needed where they stand.
    idle: Vec<UnitId>,
    used: BTreeSet<UnitId>,
    cannot_hold: BTreeSet<TerritoryId>,
    orders: Vec<MoveOrder>,
}

impl NonCombatPlanner<'_, '_> {
    /// Adds idle units one at a time, best defenders first, until `t` holds.
    /// Nothing is committed unless it does.
    fn reinforce(&mut self, t: TerritoryId) -> Result<bool, EngineError> {
        let ctx = self.ctx;
        let state = ctx.state;
        let Some(attack) = self.enemy.get(t) else {
            return Ok(true);
        };
        let attackers = attack.all_units();
        let water = state.territory(t).is_water();
        let fits = |u: &UnitId| {
            let ut = state.type_of(*u);
            if water {
                ut.is_sea() && !ut.is_transport()
            } else {
                !ut.is_sea()
            }
        };
        let mut candidates: Vec<UnitId> = self
            .idle
            .iter()
            .copied()
            .filter(|u| !self.used.contains(u) && fits(u))
            .filter(|u| state.location(*u) != Some(t) && unit_route(ctx, *u, t).is_some())
            .collect();
        candidates.sort_by(|a, b| {
            defensive_worth(state, *b)
                .cmp(&defensive_worth(state, *a))
                .then_with(|| state.type_of(*a).cost.cmp(&state.type_of(*b).cost))
                .then_with(|| a.cmp(b))
        });

        let mut defenders = state.allied_units(t, ctx.player);
        let mut added = Vec::new();
        for u in candidates {
            ctx.check_cancelled()?;
            defenders.push(u);
            added.push(u);
            if assess_hold(ctx, t, &attackers, &attack.bombard, &defenders).can_hold {
                self.used.extend(added.iter().copied());
                self.orders
                    .extend(group_moves(
                        ctx,
                        added.into_iter().map(|u| (u, t)),
                        MoveKind::Reinforce,
                    ));
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every allied land territory bordering enemy land keeps at least one
    /// defender: the cheapest idle land unit that can reach it, never taken
    /// from another border.
    fn move_one_defender_to_borders(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let player = ctx.player;
        let frontline: BTreeSet<TerritoryId> = state
            .territories
            .iter()
            .filter(|t| t.is_land() && state.is_allied_territory(t.id, player))
            .filter(|t| {
                t.neighbors()
                    .any(|n| state.territory(n).is_land() && state.is_enemy_territory(n, player))
            })
            .map(|t| t.id)
            .collect();
        let arriving: BTreeSet<TerritoryId> = self.orders.iter().map(|o| o.route.end()).collect();
        let defended = |t: TerritoryId| {
            arriving.contains(&t)
                || state.allied_units(t, player).iter().any(|u| {
                    let ut = state.type_of(*u);
                    ut.is_land() && !ut.is_infrastructure()
                })
        };

        let mut moves = Vec::new();
        for &t in &frontline {
            if self.cannot_hold.contains(&t) || defended(t) {
                continue;
            }
            let pick = self
                .idle
                .iter()
                .copied()
                .filter(|u| !self.used.contains(u) && state.type_of(*u).is_land())
                .filter(|u| state.location(*u).is_some_and(|at| !frontline.contains(&at)))
                .filter_map(|u| unit_route(ctx, u, t).map(|r| (state.type_of(u).cost, r.cost, u)))
                .min();
            if let Some((_, _, u)) = pick {
                self.used.insert(u);
                moves.push((u, t));
            }
        }
        self.orders.extend(group_moves(ctx, moves, MoveKind::Reposition));
    }

    /// Idle land units step toward the nearest enemy land, never into a
    /// territory we cannot hold.
    fn advance_land_units(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let land = &ctx.distances().land;
        let enemy_land: Vec<TerritoryId> = state
            .territories
            .iter()
            .filter(|t| t.is_land() && state.is_enemy_territory(t.id, ctx.player))
            .map(|t| t.id)
            .collect();

        let mut moves = Vec::new();
        for &u in &self.idle {
            if self.used.contains(&u) || !state.type_of(u).is_land() {
                continue;
            }
            let Some(from) = state.location(u) else {
                continue;
            };
            let nearest = enemy_land
                .iter()
                .filter_map(|e| land.get(from, *e).map(|d| (d, *e)))
                .min();
            let Some((distance, target)) = nearest else {
                continue;
            };
            if distance <= 1 {
                continue;
            }
            let step = state
                .territory(from)
                .neighbors()
                .filter(|n| {
                    state.territory(*n).is_land()
                        && state.is_allied_territory(*n, ctx.player)
                        && !self.cannot_hold.contains(n)
                })
                .filter_map(|n| land.get(n, target).map(|d| (d, n)))
                .filter(|(d, _)| *d < distance)
                .min();
            if let Some((_, n)) = step {
                moves.push((u, n));
            }
        }
        self.used.extend(moves.iter().map(|(u, _)| *u));
        self.orders.extend(group_moves(ctx, moves, MoveKind::Reposition));
    }

    /// Empty transports gather in the least threatened sea zone off one of
    /// our factories, where new units can board, and idle warships join
    /// the largest gathering as escort.
    fn position_fleet(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let player = ctx.player;
        let harbours: BTreeSet<TerritoryId> = state
            .territories
            .iter()
            .filter(|t| t.is_land() && t.owner == Some(player) && state.has_factory(t.id))
            .flat_map(|t| t.neighbors())
            .filter(|n| {
                state.territory(*n).is_water()
                    && !self.cannot_hold.contains(n)
                    && !state.has_enemy_units(*n, player)
            })
            .collect();
        if harbours.is_empty() {
            return;
        }
        let enemy = &self.enemy;
        let threat = |z: TerritoryId| estimate_strength(state, z, &enemy.units(z), true);

        let mut moves = Vec::new();
        let mut gathered: BTreeMap<TerritoryId, usize> = BTreeMap::new();
        for &u in &self.idle {
            if self.used.contains(&u)
                || !state.type_of(u).is_transport()
                || !state.cargo_of(u).is_empty()
            {
                continue;
            }
            let Some(from) = state.location(u) else {
                continue;
            };
            if harbours.contains(&from) {
                *gathered.entry(from).or_default() += 1;
                continue;
            }
            let best = harbours
                .iter()
                .copied()
                .filter_map(|h| unit_route(ctx, u, h).map(|r| (h, r.cost)))
                .min_by(|a, b| {
                    threat(a.0)
                        .total_cmp(&threat(b.0))
                        .then_with(|| a.1.cmp(&b.1))
                        .then_with(|| a.0.cmp(&b.0))
                });
            match best {
                Some((h, _)) => {
                    moves.push((u, h));
                    *gathered.entry(h).or_default() += 1;
                }
                None => ctx.observer().unit_skipped(u, "no harbour in reach"),
            }
        }

        let rally = gathered
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(z, _)| *z);
        if let Some(rally) = rally {
            for &u in &self.idle {
                let ut = state.type_of(u);
                if self.used.contains(&u)
                    || !ut.is_sea()
                    || ut.is_transport()
                    || state.location(u) == Some(rally)
                {
                    continue;
                }
                if unit_route(ctx, u, rally).is_some() {
                    moves.push((u, rally));
                }
            }
        }
        self.used.extend(moves.iter().map(|(u, _)| *u));
        self.orders.extend(group_moves(ctx, moves, MoveKind::Reposition));
    }

    /// Air standing somewhere we cannot hold flies to the least threatened
    /// allied land it can reach.
    fn retreat_exposed_air(&mut self) {
        let ctx = self.ctx;
        let state = ctx.state;
        let havens: Vec<TerritoryId> = state
            .territories
            .iter()
            .filter(|t| {
                t.is_land()
                    && state.is_allied_territory(t.id, ctx.player)
                    && !self.cannot_hold.contains(&t.id)
            })
            .map(|t| t.id)
            .collect();

        let exposed: Vec<TerritoryId> = self.cannot_hold.iter().copied().collect();
        let mut moves = Vec::new();
        for (unit, _) in movable_units(ctx, &exposed) {
            if !state.type_of(unit).is_air() || self.used.contains(&unit) {
                continue;
            }
            let haven = havens
                .iter()
                .copied()
                .filter(|h| unit_route(ctx, unit, *h).is_some())
                .map(|h| (estimate_strength(state, h, &self.enemy.units(h), true), h))
                .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            match haven {
                Some((_, h)) => moves.push((unit, h)),
                None => ctx.observer().unit_skipped(unit, "no safe landing"),
            }
        }
        self.used.extend(moves.iter().map(|(u, _)| *u));
        self.orders.extend(group_moves(ctx, moves, MoveKind::Reposition));
    }
}

/// Plans the non-combat phase for `ctx.player`.
pub fn plan_non_combat_move(ctx: &PlanningContext) -> Result<NonCombatPlan, EngineError> {
    let state = ctx.state;
    ctx.observer().phase_started(PlanPhase::NonCombatMove, ctx.player_name());
    let (enemy, assessments) = assess_allied_territories(ctx);
    ctx.check_cancelled()?;

    let sources: Vec<TerritoryId> =
        state.territory_ids().filter(|t| enemy.get(*t).is_none()).collect();
    let idle = movable_units(ctx, &sources).into_iter().map(|(u, _)| u).collect();

    let mut threatened: Vec<(TerritoryId, f64)> = assessments
        .iter()
        .filter(|a| !a.can_hold)
        .map(|a| {
            let defenders = state.allied_units(a.territory, ctx.player);
            (a.territory, defense_priority(state, a.territory, state.tuv(&defenders)))
        })
        .collect();
    threatened.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut planner = NonCombatPlanner {
        ctx,
        enemy,
        idle,
        used: BTreeSet::new(),
        cannot_hold: BTreeSet::new(),
        orders: Vec::new(),
    };
    for (t, _) in threatened {
        if !planner.reinforce(t)? {
            planner.cannot_hold.insert(t);
        }
    }
    planner.move_one_defender_to_borders();
    planner.advance_land_units();
    planner.position_fleet();
    planner.retreat_exposed_air();

    let plan = NonCombatPlan {
        orders: planner.orders,
        cannot_hold: planner.cannot_hold.into_iter().collect(),
    };
    ctx.observer().phase_finished(PlanPhase::NonCombatMove, plan.orders.len());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 17, ..Default::default() })
    }

    #[test]
    fn threatened_territory_is_reinforced() {
        // Back - Home - Front
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let back = b.land("Back", 1, Some(red));
        let home = b.land("Home", 3, Some(red));
        let front = b.land("Front", 1, Some(blue));
        b.connect(back, home);
        b.connect(home, front);
        b.add_units(red, inf, back, 5);
        b.add_units(blue, inf, front, 2);
        let state = b.build();

        let plan = plan_non_combat_move(&ctx(&state)).unwrap();
        assert!(plan.cannot_hold.is_empty());
        let reinforce = plan
            .orders
            .iter()
            .find(|o| o.kind == MoveKind::Reinforce)
            .expect("reinforcement order");
        assert_eq!(reinforce.route.end(), home);
        assert!(!reinforce.units.is_empty() && reinforce.units.len() < 5);
    }

    #[test]
    fn hopeless_territory_is_left_flagged() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let back = b.land("Back", 1, Some(red));
        let home = b.land("Home", 3, Some(red));
        let front = b.land("Front", 1, Some(blue));
        b.connect(back, home);
        b.connect(home, front);
        b.add_unit(red, inf, back);
        b.add_units(blue, arm, front, 10);
        let state = b.build();

        let plan = plan_non_combat_move(&ctx(&state)).unwrap();
        assert!(plan.cannot_hold.contains(&home));
        assert!(plan.orders.iter().all(|o| o.route.end() != home));
    }

    #[test]
    fn idle_land_advances_toward_enemy() {
        // Rear - Mid - Frontier, nobody can attack this turn
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let rear = b.land("Rear", 1, Some(red));
        let mid = b.land("Mid", 1, Some(red));
        let frontier = b.land("Frontier", 1, Some(blue));
        b.connect(rear, mid);
        b.connect(mid, frontier);
        let walker = b.add_unit(red, inf, rear);
        let state = b.build();

        let plan = plan_non_combat_move(&ctx(&state)).unwrap();
        assert_eq!(plan.orders.len(), 1);
        assert_eq!(plan.orders[0].units, vec![walker]);
        assert_eq!(plan.orders[0].route.end(), mid);
        assert_eq!(plan.orders[0].kind, MoveKind::Reposition);
    }

    #[test]
    fn empty_border_gets_the_cheapest_defender() {
        // Back(infantry, armour) - Edge - Enemy
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let arm = b.armour();
        let back = b.land("Back", 1, Some(red));
        let edge = b.land("Edge", 1, Some(red));
        let enemy = b.land("Enemy", 1, Some(blue));
        b.connect(back, edge);
        b.connect(edge, enemy);
        let walker = b.add_unit(red, inf, back);
        b.add_unit(red, arm, back);
        let state = b.build();

        let ctx = ctx(&state);
        let mut planner = NonCombatPlanner {
            ctx: &ctx,
            enemy: EnemyAttacks::default(),
            idle: movable_units(&ctx, &[back]).into_iter().map(|(u, _)| u).collect(),
            used: BTreeSet::new(),
            cannot_hold: BTreeSet::new(),
            orders: Vec::new(),
        };
        planner.move_one_defender_to_borders();
        assert_eq!(planner.orders.len(), 1);
        assert_eq!(planner.orders[0].units, vec![walker]);
        assert_eq!(planner.orders[0].route.end(), edge);

        // Edge is now covered; a second pass sends nobody
        planner.move_one_defender_to_borders();
        assert_eq!(planner.orders.len(), 1);
    }

    #[test]
    fn fleet_gathers_off_our_factory() {
        // Port(factory) - Harbour - Open - Far; Blue is far away
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let fac = b.factory();
        let tr = b.transport();
        let dd = b.destroyer();
        let port = b.land("Port", 3, Some(red));
        let harbour = b.water("Harbour");
        let open = b.water("Open");
        let far = b.water("Far");
        b.land("Distant", 1, Some(blue));
        b.connect(port, harbour);
        b.connect(harbour, open);
        b.connect(open, far);
        b.add_unit(red, fac, port);
        let transport = b.add_unit(red, tr, open);
        let escort = b.add_unit(red, dd, far);
        let state = b.build();

        let plan = plan_non_combat_move(&ctx(&state)).unwrap();
        let moved: Vec<UnitId> = plan
            .orders
            .iter()
            .filter(|o| o.route.end() == harbour)
            .flat_map(|o| o.units.iter().copied())
            .collect();
        assert!(moved.contains(&transport));
        assert!(moved.contains(&escort));
    }

    #[test]
    fn capital_outranks_richer_land() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let cap = b.land("Cap", 2, Some(red));
        let rich = b.land("Rich", 8, Some(red));
        b.capital(cap, red);
        let state = b.build();
        assert!(defense_priority(&state, cap, 0.0) > defense_priority(&state, rich, 0.0));
    }
}
