//! Cheap strength estimates and local superiority checks.
//!
//! These run without any simulation and are used to prune hopeless or
//! overwhelming battles before the dice loop, to rank purchases, and to
//! decide whether an area around a territory is safe.

use crate::board::{GameState, TerritoryId, UnitId};
use crate::context::PlanningContext;

use super::support::{total_power, unit_powers};

/// Range used for short local-superiority checks.
pub const SHORT_RANGE: u32 = 2;
/// Range used for medium local-superiority checks.
pub const MEDIUM_RANGE: u32 = 3;

/// Units of `units` that take part in a battle at `t`.
///
/// Land battles see land and air units; sea battles see sea and air units.
/// Cargo aboard transports and infrastructure never fight.
pub fn battle_participants(state: &GameState, t: TerritoryId, units: &[UnitId]) -> Vec<UnitId> {
    let on_land = state.territory(t).is_land();
    units
        .iter()
        .copied()
        .filter(|u| {
            let ut = state.type_of(*u);
            if !ut.is_combatant() {
                return false;
            }
            if on_land {
                ut.is_land() || ut.is_air()
            } else {
                ut.is_sea() || ut.is_air()
            }
        })
        .collect()
}

/// Remaining hit points of the given units.
pub fn hit_points(state: &GameState, units: &[UnitId]) -> u32 {
    units
        .iter()
        .map(|u| {
            let ut = state.type_of(*u);
            if ut.is_combatant() {
                ut.hit_points.saturating_sub(state.unit(*u).damage)
            } else {
                0
            }
        })
        .sum()
}

/// Strength of a unit group: `2 × hit points + power` with power normalised
/// to a six-sided die.
pub fn estimate_strength(
    state: &GameState,
    t: TerritoryId,
    units: &[UnitId],
    attacking: bool,
) -> f64 {
    let fighters = battle_participants(state, t, units);
    let hp = hit_points(state, &fighters) as f64;
    let power = total_power(&unit_powers(state, &fighters, attacking, &[])) as f64;
    2.0 * hp + power * 6.0 / state.dice_sides as f64
}

/// Maps two strengths to a 0-centred-at-50 difference score.
pub fn difference_from_strengths(attack: f64, defense: f64) -> f64 {
    if defense <= 0.0 {
        return 100.0;
    }
    ((attack - defense) / defense.powf(0.85)) * 50.0 + 50.0
}

/// Attacker-versus-defender strength difference; 50 means even.
pub fn strength_difference(
    state: &GameState,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
) -> f64 {
    if attackers.is_empty() {
        return 0.0;
    }
    if defenders.iter().all(|u| !state.type_of(*u).is_combatant()) {
        return 100.0;
    }
    let a = estimate_strength(state, t, attackers, true);
    let d = estimate_strength(state, t, defenders, false);
    difference_from_strengths(a, d)
}

/// Whether the attack wins outright: no defenders, powerless defenders, or
/// attack power at least the defenders' hit points.
pub fn is_overwhelming_win(
    state: &GameState,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
) -> bool {
    let defenders = battle_participants(state, t, defenders);
    if defenders.is_empty() {
        return true;
    }
    let attackers = battle_participants(state, t, attackers);
    let attack_power = total_power(&unit_powers(state, &attackers, true, &[]));
    let defense_power = total_power(&unit_powers(state, &defenders, false, &[]));
    if defense_power == 0 {
        return attack_power > 0;
    }
    attack_power / state.dice_sides >= hit_points(state, &defenders)
}

/// Whether nearby enemy land strength does not outclass our own around `t`
/// at every radius from 2 up to `distance`.
pub fn has_local_land_superiority(ctx: &PlanningContext, t: TerritoryId, distance: u32) -> bool {
    let state = ctx.state;
    let matrix = if state.territory(t).is_land() {
        &ctx.distances().land
    } else {
        &ctx.distances().any
    };
    for radius in 2..=distance {
        let mut enemy = Vec::new();
        for near in matrix.within(t, radius) {
            enemy.extend(state.enemy_units(near, ctx.player));
        }
        let mut allied = Vec::new();
        for near in matrix.within(t, radius - 1) {
            allied.extend(state.allied_units(near, ctx.player));
        }
        if strength_difference(state, t, &enemy, &allied) > 50.0 {
            return false;
        }
    }
    true
}

/// Whether our fleet around sea zone `t` can both survive the nearby enemy
/// and beat it.
pub fn has_local_naval_superiority(ctx: &PlanningContext, t: TerritoryId) -> bool {
    let state = ctx.state;
    let any = &ctx.distances().any;

    let land_distance = state
        .territories
        .iter()
        .filter(|x| state.is_enemy_territory(x.id, ctx.player))
        .filter_map(|x| any.get(t, x.id))
        .min()
        .unwrap_or(10);
    let enemy_distance = (land_distance + 1).max(3);
    let allied_distance = (enemy_distance + 1) / 2;

    let mut enemy = Vec::new();
    for near in any.within(t, enemy_distance) {
        for u in state.enemy_units(near, ctx.player) {
            let ut = state.type_of(u);
            if ut.is_sea() || ut.is_air() {
                enemy.push(u);
            }
        }
    }
    let mut mine = Vec::new();
    let mut allied = Vec::new();
    for near in any.within(t, allied_distance) {
        for u in state.allied_units(near, ctx.player) {
            if !state.type_of(u).is_sea() {
                continue;
            }
            if state.unit(u).owner == ctx.player {
                mine.push(u);
            } else {
                allied.push(u);
            }
        }
    }

    let mut defenders = mine.clone();
    defenders.extend(allied.iter().copied());
    let defense_difference = strength_difference(state, t, &enemy, &defenders);

    let attack_difference = if enemy.is_empty() {
        100.0
    } else {
        let attack = estimate_strength(state, t, &mine, true)
            + 0.5 * estimate_strength(state, t, &allied, true);
        difference_from_strengths(attack, estimate_strength(state, t, &enemy, false))
    };
    defense_difference < 50.0 && attack_difference > 50.0
}
