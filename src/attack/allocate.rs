//! Unit-to-territory allocation and the frontier search over ranked targets.
//!
//! `try_to_attack_territories` is a single greedy allocation over a set of
//! targets. `determine_territories_to_attack` grows that set one ranked
//! target at a time and drops the newest target whenever the allocation no
//! longer wins everything.

use std::collections::BTreeSet;

use crate::battle::{battle_participants, is_overwhelming_win, strength_difference, BattleResult};
use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;
use crate::error::EngineError;
use crate::eval::min_cost_per_hit_point;
use crate::observer::PlanPhase;
use crate::options::{
    air_distance, naval_reach, select_cargo, sort_unit_move_options,
    sort_unit_needed_options_then_attack,
    AmphibRoute, EnemyAttacks, UnitOptions,
};

use super::AttackPlanner;

/// Cheap units keep joining the weakest attack until it reaches this
/// strength difference.
const ATTACK_STRENGTH_CUTOFF: f64 = 40.0;

/// Whether `t` is within half of the unit's range, or important enough to
/// fly further for: an enemy capital or land next to an allied capital.
fn air_in_range(ctx: &PlanningContext, unit: UnitId, t: TerritoryId) -> bool {
    let state = ctx.state;
    let range = state.type_of(unit).movement;
    if air_distance(ctx, unit, t).is_some_and(|d| d * 2 <= range) {
        return true;
    }
    let terr = state.territory(t);
    (terr.is_capital() && state.is_enemy_territory(t, ctx.player))
        || terr
            .neighbors()
            .any(|n| state.territory(n).is_capital() && state.is_allied_territory(n, ctx.player))
}

/// Whether adding air to this battle helps: real defenders, no walkover,
/// and no anti-air unless the battle is still in doubt.
fn air_useful(
    ctx: &PlanningContext,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
    result: &BattleResult,
) -> bool {
    let state = ctx.state;
    !battle_participants(state, t, defenders).is_empty()
        && !is_overwhelming_win(state, t, attackers, defenders)
        && (!state.has_enemy_anti_air(t, ctx.player)
            || result.win_percentage < ctx.min_win_percentage())
}

fn next_to_allied_factory(ctx: &PlanningContext, t: TerritoryId) -> bool {
    let state = ctx.state;
    state
        .territory(t)
        .neighbors()
        .any(|n| state.is_allied_territory(n, ctx.player) && state.has_factory(n))
}

/// Unload sea for an amphibious leg: the reachable sea next to `t` that
/// borders every load territory and is least threatened, else the route's
/// own unload point.
fn choose_unload_sea(
    ctx: &PlanningContext,
    enemy: &EnemyAttacks,
    transport: UnitId,
    t: TerritoryId,
    route: &AmphibRoute,
) -> TerritoryId {
    let state = ctx.state;
    let Some(from) = state.location(transport) else {
        return route.unload_from;
    };
    let reach = naval_reach(ctx, from, state.movement_left(transport));
    let mut best: Option<(TerritoryId, f64)> = None;
    for sea in state.territory(t).neighbors() {
        if !reach.contains(&sea) {
            continue;
        }
        let borders_loads = route
            .load_from
            .iter()
            .all(|l| state.territory(*l).neighbors().any(|n| n == sea));
        if !borders_loads {
            continue;
        }
        let mut defenders = state.allied_units(sea, ctx.player);
        defenders.push(transport);
        let threat = strength_difference(state, sea, &enemy.units(sea), &defenders);
        if best.map_or(true, |(_, d)| threat < d) {
            best = Some((sea, threat));
        }
    }
    best.map_or(route.unload_from, |(sea, _)| sea)
}

impl AttackPlanner<'_, '_> {
    /// Greedy allocation of every free unit over `targets`. Returns the
    /// options of the units left unassigned.
    pub(super) fn try_to_attack_territories(&mut self, targets: &[TerritoryId]) -> UnitOptions {
        let ctx = self.ctx;
        let state = ctx.state;
        let threshold = ctx.win_percentage();
        self.maps.clear_assignments();

        let wanted: BTreeSet<TerritoryId> = targets.iter().copied().collect();
        let mut options: UnitOptions = self
            .maps
            .unit_options
            .iter()
            .filter(|(u, _)| !self.already_moved.contains(*u))
            .map(|(u, ts)| (*u, ts.intersection(&wanted).copied().collect::<BTreeSet<_>>()))
            .filter(|(_, ts)| !ts.is_empty())
            .collect();
        let attacks = &mut self.maps.territories;

        // Destroyers where subs defend
        for (u, ts) in sort_unit_move_options(ctx, &options) {
            if !state.type_of(u).capabilities.destroyer {
                continue;
            }
            for t in ts {
                let Some(opt) = attacks.get_mut(&t) else {
                    continue;
                };
                let subs = opt.defenders(ctx).iter().any(|d| state.type_of(*d).capabilities.sub);
                let covered = opt.units().iter().any(|a| state.type_of(*a).capabilities.destroyer);
                if subs && !covered && opt.add_unit(u) {
                    options.remove(&u);
                    break;
                }
            }
        }

        // Cheap non-air units to the weakest attack
        let min_cost = min_cost_per_hit_point(state, ctx.player);
        for (u, ts) in sort_unit_move_options(ctx, &options) {
            let ut = state.type_of(u);
            let cost_per_hit = ut.cost as f64 / ut.hit_points.max(1) as f64;
            let expensive = ut.is_land() && cost_per_hit > 2.0 * min_cost;
            if ut.is_air() || expensive {
                continue;
            }
            let mut best: Option<(TerritoryId, f64)> = None;
            for t in ts {
                let Some(opt) = attacks.get(&t) else {
                    continue;
                };
                if state.territory(t).is_water() && !opt.can_hold {
                    continue;
                }
                let difference = strength_difference(
                    state,
                    t,
                    &opt.attackers(),
                    &opt.defenders(ctx),
                );
                if best.map_or(true, |(_, d)| difference < d) {
                    best = Some((t, difference));
                }
            }
            if let Some((t, difference)) = best {
                if difference < ATTACK_STRENGTH_CUTOFF
                    && attacks.get_mut(&t).is_some_and(|o| o.add_unit(u))
                {
                    options.remove(&u);
                }
            }
        }

        // Non-air to holdable attacks that are not yet won
        for (u, ts) in sort_unit_needed_options_then_attack(ctx, &options, attacks) {
            if state.type_of(u).is_air() {
                continue;
            }
            let mut best = None;
            let mut min_win = threshold;
            for t in ts {
                let Some(opt) = attacks.get_mut(&t) else {
                    continue;
                };
                if !opt.can_hold {
                    continue;
                }
                let result = opt.result(ctx);
                if result.is_win(threshold) {
                    continue;
                }
                if !result.has_land_unit_remaining {
                    best = Some(t);
                    break;
                }
                if result.win_percentage < min_win {
                    min_win = result.win_percentage;
                    best = Some(t);
                }
            }
            if let Some(t) = best {
                if attacks.get_mut(&t).is_some_and(|o| o.add_unit(u)) {
                    options.remove(&u);
                }
            }
        }

        // Air to attacks we will not hold, where it is needed
        for (u, ts) in sort_unit_needed_options_then_attack(ctx, &options, attacks) {
            if !state.type_of(u).is_air() {
                continue;
            }
            let mut best = None;
            let mut min_win = threshold;
            for t in ts {
                let Some(opt) = attacks.get_mut(&t) else {
                    continue;
                };
                if opt.can_hold || opt.is_strafing || !air_in_range(ctx, u, t) {
                    continue;
                }
                let attackers = opt.attackers();
                let defenders = opt.defenders(ctx);
                let result = opt.result(ctx);
                if result.is_win(threshold) || !air_useful(ctx, t, &attackers, &defenders, result) {
                    continue;
                }
                if result.win_percentage < min_win {
                    min_win = result.win_percentage;
                    best = Some(t);
                }
            }
            if let Some(t) = best {
                if attacks.get_mut(&t).is_some_and(|o| o.add_unit(u)) {
                    options.remove(&u);
                }
            }
        }

        // Everything left to whatever is still not won
        for (u, ts) in sort_unit_needed_options_then_attack(ctx, &options, attacks) {
            let ut = state.type_of(u);
            let mut best = None;
            let mut min_win = threshold;
            for t in ts {
                let Some(opt) = attacks.get_mut(&t) else {
                    continue;
                };
                if ut.is_air() {
                    let far = !next_to_allied_factory(ctx, t) && !air_in_range(ctx, u, t);
                    let cheap = opt.value < ut.cost as f64
                        || (state.territory(t).is_land() && !opt.can_hold);
                    if far && cheap {
                        continue;
                    }
                }
                let attackers = opt.attackers();
                let defenders = opt.defenders(ctx);
                let result = opt.result(ctx);
                if result.is_win(threshold) {
                    continue;
                }
                if ut.is_air() && !air_useful(ctx, t, &attackers, &defenders, result) {
                    continue;
                }
                if !result.has_land_unit_remaining {
                    best = Some(t);
                    break;
                }
                if result.win_percentage < min_win {
                    min_win = result.win_percentage;
                    best = Some(t);
                }
            }
            if let Some(t) = best {
                if attacks.get_mut(&t).is_some_and(|o| o.add_unit(u)) {
                    options.remove(&u);
                }
            }
        }

        // Amphibious legs to the weakest attack each transport can reach
        let mut carried: BTreeSet<UnitId> = attacks.values().flat_map(|o| o.attackers()).collect();
        for (transport, routes) in &self.maps.transport_options {
            if self.already_moved.contains(transport) {
                continue;
            }
            let mut best: Option<(TerritoryId, f64)> = None;
            for t in routes.keys() {
                if !wanted.contains(t) {
                    continue;
                }
                let Some(opt) = attacks.get_mut(t) else {
                    continue;
                };
                let result = opt.result(ctx);
                if result.is_win(threshold) {
                    continue;
                }
                if best.map_or(true, |(_, w)| result.win_percentage < w) {
                    best = Some((*t, result.win_percentage));
                }
            }
            let Some((t, _)) = best else {
                continue;
            };
            let route = &routes[&t];
            let candidates: Vec<UnitId> = route
                .cargo
                .iter()
                .copied()
                .filter(|c| !carried.contains(c) && !self.already_moved.contains(c))
                .collect();
            let cargo = select_cargo(state, *transport, &candidates);
            if cargo.is_empty() {
                continue;
            }
            let unload = choose_unload_sea(ctx, &self.enemy, *transport, t, route);
            let added = attacks
                .get_mut(&t)
                .is_some_and(|o| o.add_amphib(*transport, cargo.clone(), unload));
            if added {
                for c in &cargo {
                    options.remove(c);
                }
                carried.extend(cargo);
            }
        }

        // Bombardment from the unload seas of amphibious attacks
        let busy: BTreeSet<UnitId> = attacks.values().flat_map(|o| o.units().to_vec()).collect();
        for (ship, by_target) in &self.maps.bombard_options {
            if busy.contains(ship) || self.already_moved.contains(ship) {
                continue;
            }
            let mut best: Option<(TerritoryId, TerritoryId, f64)> = None;
            for (t, seas) in by_target {
                if !wanted.contains(t) {
                    continue;
                }
                let Some(opt) = attacks.get_mut(t) else {
                    continue;
                };
                if opt.amphib_attacks().is_empty() || opt.defenders(ctx).is_empty() {
                    continue;
                }
                let unloads: BTreeSet<TerritoryId> =
                    opt.transport_unload_from().values().copied().collect();
                let Some(from) = seas.iter().copied().find(|s| unloads.contains(s)) else {
                    continue;
                };
                let win = opt.result(ctx).win_percentage;
                if best.map_or(true, |(_, _, w)| win < w) {
                    best = Some((*t, from, win));
                }
            }
            if let Some((t, from, _)) = best {
                if attacks.get_mut(&t).is_some_and(|o| o.add_bombard(*ship, from)) {
                    options.remove(ship);
                }
            }
        }

        options
    }

    fn transports_exhausted(&self, working: &[TerritoryId]) -> bool {
        let free: Vec<&UnitId> = self
            .maps
            .transport_options
            .keys()
            .filter(|t| !self.already_moved.contains(*t))
            .collect();
        if free.is_empty() {
            return false;
        }
        let used: BTreeSet<UnitId> = working
            .iter()
            .filter_map(|t| self.maps.territories.get(t))
            .flat_map(|o| o.amphib_attacks().keys().copied())
            .collect();
        free.iter().all(|t| used.contains(*t))
    }

    /// Frontier search: attempt the top `k` ranked targets together, growing
    /// `k` on success and dropping the `k`-th target on failure.
    ///
    /// On timeout the largest frontier proven feasible is committed.
    pub(super) fn determine_territories_to_attack(&mut self) -> Result<(), EngineError> {
        let ctx = self.ctx;
        let state = ctx.state;
        let threshold = ctx.win_percentage();
        let mut k = self.prioritized.len().min(1);
        let mut feasible = 0;

        while k > 0 && k <= self.prioritized.len() {
            ctx.check_cancelled()?;
            if ctx.time_exceeded() {
                ctx.observer().search_timeout(PlanPhase::CombatMove, feasible);
                let beyond: Vec<TerritoryId> = self.prioritized[feasible..].to_vec();
                for t in beyond {
                    self.remove_target(t, "time budget exhausted");
                }
                break;
            }

            let working: Vec<TerritoryId> = self.prioritized[..k].to_vec();
            self.try_to_attack_territories(&working);

            let mut succeeded = true;
            let mut differences = Vec::with_capacity(k);
            for t in &working {
                let Some(opt) = self.maps.territories.get_mut(t) else {
                    continue;
                };
                let difference = strength_difference(
                    state,
                    *t,
                    &opt.attackers(),
                    &opt.defenders(ctx),
                );
                differences.push((*t, difference));
                // A weaker force already proved enough for this target
                if opt.is_strafing || difference >= opt.strength_estimate {
                    continue;
                }
                let result = opt.result(ctx);
                if result.win_percentage < threshold || !result.has_land_unit_remaining {
                    succeeded = false;
                    break;
                }
            }
            ctx.observer().allocation_round(k, self.prioritized.len(), succeeded);

            if succeeded {
                for (t, difference) in differences {
                    if let Some(opt) = self.maps.territories.get_mut(&t) {
                        opt.strength_estimate = opt.strength_estimate.min(difference);
                    }
                }
                feasible = k;
                if self.transports_exhausted(&working) {
                    let stranded: Vec<TerritoryId> = self.prioritized[k..]
                        .iter()
                        .copied()
                        .filter(|t| {
                            self.maps
                                .territories
                                .get(t)
                                .is_some_and(|o| o.need_amphib_units)
                        })
                        .collect();
                    for t in stranded {
                        self.remove_target(t, "no transport left");
                    }
                }
                k += 1;
            } else {
                let dropped = self.prioritized[k - 1];
                self.remove_target(dropped, "allocation infeasible");
                if k > self.prioritized.len() {
                    // The first k - 1 targets were already proven together
                    break;
                }
            }
        }
        Ok(())
    }
}
