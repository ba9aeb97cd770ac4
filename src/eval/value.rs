//! Strategic territory values.
//!
//! Scores territories by how much holding them matters: closeness to enemy
//! capitals and factories, nearby enemy production, and the size of the
//! land mass they belong to. Shared by the attack planner (hold checks), the
//! non-combat planner (where to reinforce), and the purchase planner (where
//! to place).
//!
//! One value map is built per query set. Distances come from the
//! context's pre-computed matrices, sea distances from a water-only route
//! search.

use std::collections::{BTreeMap, BTreeSet};

use crate::battle::estimate_strength;
use crate::board::{find_route, reachable_within, GameState, PlayerId, TerritoryId};
use crate::context::PlanningContext;

/// Radius that always counts as "nearby" for enemy capitals and factories.
const NEARBY_FACTORY_DISTANCE: u32 = 9;
/// Radius defining a territory's land mass.
const LAND_MASS_RADIUS: u32 = 6;

/// Value per territory, zero for anything not computed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerritoryValues {
    values: BTreeMap<TerritoryId, f64>,
}

impl TerritoryValues {
    pub fn get(&self, t: TerritoryId) -> f64 {
        self.values.get(&t).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, t: TerritoryId) -> bool {
        self.values.contains_key(&t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TerritoryId, f64)> + '_ {
        self.values.iter().map(|(t, v)| (*t, *v))
    }

    pub fn insert(&mut self, t: TerritoryId, value: f64) {
        self.values.insert(t, value);
    }
}

/// Cheapest cost per hit point among the land units `player` can buy.
pub fn min_cost_per_hit_point(state: &GameState, player: PlayerId) -> f64 {
    state
        .player(player)
        .production
        .iter()
        .filter_map(|rule| {
            let ut = state.unit_type(rule.unit_type);
            if !ut.is_land() || ut.is_infrastructure() || ut.hit_points == 0 {
                return None;
            }
            Some(rule.cost as f64 / (ut.hit_points * rule.quantity.max(1)) as f64)
        })
        .min_by(|a, b| a.total_cmp(b))
        .unwrap_or(3.0)
}

/// Relative value of taking `t`: production, doubled for an enemy factory,
/// minus the expected cost of fighting a neutral garrison.
pub fn territory_attack_value(ctx: &PlanningContext, t: TerritoryId) -> f64 {
    let state = ctx.state;
    let terr = state.territory(t);
    let enemy_factory = state.is_enemy_territory(t, ctx.player) && state.has_factory(t);
    let mut value = 3.0 * terr.production as f64 * if enemy_factory { 2.0 } else { 1.0 };
    if state.is_neutral_land(t) {
        let defenders = state.defending_units(t, ctx.player);
        let strength = estimate_strength(state, t, &defenders, false);
        value -= (strength / 8.0) * min_cost_per_hit_point(state, ctx.player);
    }
    value
}

/// Enemy land or land we already expect to lose.
fn is_enemy_or_cant_hold(
    ctx: &PlanningContext,
    t: TerritoryId,
    cant_hold: &BTreeSet<TerritoryId>,
) -> bool {
    let state = ctx.state;
    state.territory(t).is_land()
        && (state.is_enemy_territory(t, ctx.player)
            || state.is_neutral_land(t)
            || cant_hold.contains(&t))
}

fn max_land_mass_size(ctx: &PlanningContext) -> usize {
    let land = &ctx.distances().land;
    let mut seen = BTreeSet::new();
    let mut max = 1;
    for t in ctx.state.territories.iter().filter(|t| t.is_land()) {
        if seen.contains(&t.id) {
            continue;
        }
        let mass = land.within(t.id, u32::MAX);
        max = max.max(mass.len());
        seen.extend(mass);
    }
    max
}

/// Enemy capitals and factories worth marching on, with their base value.
fn enemy_capitals_and_factories(
    ctx: &PlanningContext,
    max_land_mass: usize,
    cant_hold: &BTreeSet<TerritoryId>,
    attacking: &BTreeSet<TerritoryId>,
) -> BTreeMap<TerritoryId, f64> {
    let state = ctx.state;
    let player = ctx.player;
    let mut targets: BTreeSet<TerritoryId> = state
        .territories
        .iter()
        .filter(|t| t.is_land() && state.has_factory(t.id))
        .filter(|t| state.is_enemy_territory(t.id, player) || cant_hold.contains(&t.id))
        .map(|t| t.id)
        .collect();
    let enemy_owned = state
        .territories
        .iter()
        .filter(|t| state.is_enemy_territory(t.id, player))
        .count();
    // Factories everywhere carry no signal
    if targets.len() * 2 >= enemy_owned {
        targets.clear();
    }
    for t in &state.territories {
        if let Some(owner) = t.capital_of {
            if t.owner == Some(owner) && state.is_at_war(player, owner) {
                targets.insert(t.id);
            }
        }
    }
    targets.retain(|t| !attacking.contains(t));

    let land = &ctx.distances().land;
    targets
        .into_iter()
        .map(|t| {
            let terr = state.territory(t);
            let factory_production =
                if state.has_factory(t) { terr.production as f64 } else { 0.0 };
            let player_production = match (terr.capital_of, terr.owner) {
                (Some(_), Some(owner)) => state.income(owner) as f64,
                _ => 0.0,
            };
            let neutral = if state.is_neutral_land(t) { 1.0 } else { 0.0 };
            let land_mass = land.within(t, LAND_MASS_RADIUS).len() as f64;
            let value = (factory_production + player_production.sqrt()).sqrt() * 32.0
                / (1.0 + 3.0 * neutral)
                * land_mass
                / max_land_mass as f64;
            (t, value)
        })
        .collect()
}

/// Targets within the nearby radius, or the closest ones if none are.
fn nearby_targets(
    ctx: &PlanningContext,
    from: TerritoryId,
    targets: &BTreeMap<TerritoryId, f64>,
) -> Vec<TerritoryId> {
    let any = &ctx.distances().any;
    let with_distance: Vec<(TerritoryId, u32)> = targets
        .keys()
        .filter_map(|t| any.get(from, *t).map(|d| (*t, d)))
        .collect();
    let near: Vec<TerritoryId> = with_distance
        .iter()
        .filter(|(_, d)| *d <= NEARBY_FACTORY_DISTANCE)
        .map(|(t, _)| *t)
        .collect();
    if !near.is_empty() {
        return near;
    }
    let Some(closest) = with_distance.iter().map(|(_, d)| *d).min() else {
        return Vec::new();
    };
    with_distance
        .into_iter()
        .filter(|(_, d)| *d == closest)
        .map(|(t, _)| t)
        .collect()
}

/// Sums halving contributions: best first, each next one worth half as much.
fn halving_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| b.total_cmp(a));
    values
        .iter()
        .enumerate()
        .map(|(i, v)| v / 2f64.powi(i as i32))
        .sum()
}

fn sea_steps(state: &GameState, from: TerritoryId, to: TerritoryId) -> Option<u32> {
    find_route(state, from, to, |x| x.is_water()).map(|r| r.len() as u32)
}

struct ValueInputs<'s> {
    max_land_mass: usize,
    capitals: BTreeMap<TerritoryId, f64>,
    cant_hold: &'s BTreeSet<TerritoryId>,
    attacking: &'s BTreeSet<TerritoryId>,
}

fn land_value(ctx: &PlanningContext, t: TerritoryId, inputs: &ValueInputs) -> f64 {
    if inputs.cant_hold.contains(&t) {
        return 0.0;
    }
    let state = ctx.state;
    let land = &ctx.distances().land;

    let capital_value = halving_sum(
        nearby_targets(ctx, t, &inputs.capitals)
            .into_iter()
            .filter_map(|target| {
                let d = land.get(t, target).filter(|d| *d > 0)?;
                Some(inputs.capitals[&target] / 2f64.powi(d as i32))
            })
            .collect(),
    );

    let mut nearby_enemy = 0.0;
    for near in land.within(t, 2) {
        if inputs.attacking.contains(&near) || !is_enemy_or_cant_hold(ctx, near, inputs.cant_hold) {
            continue;
        }
        // An enemy territory counts itself at full value
        let Some(d) = land.get(t, near) else {
            continue;
        };
        let value = if state.is_neutral_land(near) {
            territory_attack_value(ctx, near) / 3.0
        } else {
            state.territory(near).production as f64
        };
        if value > 0.0 {
            nearby_enemy += value / 2f64.powi(d as i32);
        }
    }

    let land_mass = land.within(t, LAND_MASS_RADIUS).len() as f64;
    let mut value = nearby_enemy * land_mass / inputs.max_land_mass as f64 + capital_value;
    if state.has_factory(t) {
        value *= 1.1;
    }
    value
}

fn water_value(
    ctx: &PlanningContext,
    t: TerritoryId,
    inputs: &ValueInputs,
    known: &mut TerritoryValues,
) -> f64 {
    let state = ctx.state;
    let has_water_neighbor = state.territory(t).neighbors().any(|n| state.territory(n).is_water());
    if inputs.cant_hold.contains(&t) || !has_water_neighbor {
        return 0.0;
    }

    let capital_value = halving_sum(
        nearby_targets(ctx, t, &inputs.capitals)
            .into_iter()
            .filter_map(|target| {
                let d = sea_steps(state, t, target).filter(|d| *d > 0)?;
                Some(inputs.capitals[&target] / 2f64.powi(d as i32))
            })
            .collect(),
    );

    let mut nearby_land = 0.0;
    let reach = reachable_within(state, t, 3, |x| x.is_water());
    for (near, d) in reach {
        if d == 0 || !state.territory(near).is_land() || inputs.attacking.contains(&near) {
            continue;
        }
        if is_enemy_or_cant_hold(ctx, near, inputs.cant_hold) {
            nearby_land += if state.is_neutral_land(near) {
                territory_attack_value(ctx, near)
            } else {
                state.territory(near).production as f64
            };
        }
        if !known.contains(near) {
            known.insert(near, land_value(ctx, near, inputs));
        }
        nearby_land += known.get(near);
    }
    capital_value / 100.0 + nearby_land / 10.0
}

/// Strategic value of every territory in `check`.
///
/// `cant_hold` territories are worth nothing to us; `attacking` territories
/// are excluded as targets since this turn's plan already covers them.
pub fn find_territory_values(
    ctx: &PlanningContext,
    cant_hold: &BTreeSet<TerritoryId>,
    attacking: &BTreeSet<TerritoryId>,
    check: impl IntoIterator<Item = TerritoryId>,
) -> TerritoryValues {
    let max_land_mass = max_land_mass_size(ctx);
    let inputs = ValueInputs {
        max_land_mass,
        capitals: enemy_capitals_and_factories(ctx, max_land_mass, cant_hold, attacking),
        cant_hold,
        attacking,
    };
    let check: BTreeSet<TerritoryId> = check.into_iter().collect();
    let mut values = TerritoryValues::default();
    for &t in &check {
        if ctx.state.territory(t).is_land() {
            values.insert(t, land_value(ctx, t, &inputs));
        }
    }
    for &t in &check {
        if ctx.state.territory(t).is_water() {
            let v = water_value(ctx, t, &inputs, &mut values);
            values.insert(t, v);
        }
    }
    values
}
