//! Battle Outcome Estimator.
//!
//! Resolves degenerate battles analytically, prunes hopeless and
//! overwhelming ones with strength estimates, and otherwise runs a bounded
//! number of independent dice simulations in parallel. Every simulation
//! draws from its own seeded stream, so the aggregate is identical no matter
//! how rayon schedules the runs.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::board::{GameState, TerritoryId, UnitId};
use crate::context::{mix, PlanningContext};

use super::result::BattleResult;
use super::simulate::{simulate_battle, DiceRules, Fighter, Side, SimOutcome};
use super::strength::{battle_participants, hit_points, strength_difference};
use super::support::{total_power, unit_powers};

/// Strength difference below which an attack is treated as lost.
const ATTACK_LOSS_DIFFERENCE: f64 = 45.0;
/// Strength difference above which a defence is treated as lost.
const DEFEND_LOSS_DIFFERENCE: f64 = 55.0;
/// Minimum number of simulated battles per estimate.
const MIN_RUNS: usize = 16;
/// Adaptive run count before subtracting the smaller army size.
const BASE_RUNS: usize = 100;

/// Whose interest the estimate is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    /// We are attacking: optimistic pruning would over-commit, so prune losses.
    Attacker,
    /// We are defending: prune clear enemy wins instead.
    Defender,
}

/// Estimates a battle at `t`.
pub fn estimate(
    ctx: &PlanningContext,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
    bombarding: &[UnitId],
    perspective: Perspective,
) -> BattleResult {
    match perspective {
        Perspective::Attacker => estimate_attack_battle_results(
            ctx,
            t,
            attackers,
            defenders,
            bombarding,
        ),
        Perspective::Defender => estimate_defend_battle_results(
            ctx,
            t,
            attackers,
            defenders,
            bombarding,
        ),
    }
}

/// Attack-side estimate: weak attacks short-circuit to a loss.
pub fn estimate_attack_battle_results(
    ctx: &PlanningContext,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
    bombarding: &[UnitId],
) -> BattleResult {
    let state = ctx.state;
    if let Some(result) = check_if_no_attackers_or_defenders(state, t, attackers, defenders) {
        return result;
    }
    let difference = strength_difference(state, t, attackers, defenders);
    if difference < ATTACK_LOSS_DIFFERENCE || is_outmatched(state, t, attackers, defenders) {
        return BattleResult::loss(defenders);
    }
    if let Some(result) = overwhelming_result(state, t, attackers, defenders) {
        return result;
    }
    calculate_battle_results(ctx, t, attackers, defenders, bombarding)
}

/// Defend-side estimate: clearly superior attackers short-circuit to an
/// attacker win.
pub fn estimate_defend_battle_results(
    ctx: &PlanningContext,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
    bombarding: &[UnitId],
) -> BattleResult {
    let state = ctx.state;
    if let Some(result) = check_if_no_attackers_or_defenders(state, t, attackers, defenders) {
        return result;
    }
    let difference = strength_difference(state, t, attackers, defenders);
    if difference > DEFEND_LOSS_DIFFERENCE {
        let land_remaining = !(state.territory(t).is_land()
            && attackers.iter().all(|u| state.type_of(*u).is_air()));
        return BattleResult {
            win_percentage: 100.0,
            tuv_swing: 999.0 + difference,
            has_land_unit_remaining: land_remaining,
            average_attackers_remaining: attackers.to_vec(),
            average_defenders_remaining: Vec::new(),
            battle_rounds: 1.0,
            simulated_runs: 0,
        };
    }
    if let Some(result) = overwhelming_result(state, t, attackers, defenders) {
        return result;
    }
    calculate_battle_results(ctx, t, attackers, defenders, bombarding)
}

/// Resolves battles that need no simulation at all.
pub fn check_if_no_attackers_or_defenders(
    state: &GameState,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
) -> Option<BattleResult> {
    let terr = state.territory(t);
    let no_defenders = defenders.iter().all(|u| !state.type_of(*u).is_combatant());
    let only_air_on_land = terr.is_land() && attackers.iter().all(|u| state.type_of(*u).is_air());

    if attackers.is_empty() || (no_defenders && only_air_on_land) {
        return Some(BattleResult::empty());
    }
    if no_defenders {
        let land_remaining = if terr.is_land() {
            attackers.iter().any(|u| state.type_of(*u).is_land())
        } else {
            true
        };
        return Some(BattleResult {
            win_percentage: 100.0,
            tuv_swing: 0.0,
            has_land_unit_remaining: land_remaining,
            average_attackers_remaining: attackers.to_vec(),
            average_defenders_remaining: Vec::new(),
            battle_rounds: 0.0,
            simulated_runs: 0,
        });
    }
    if state.sub_retreat_before_battle
        && defenders.iter().all(|u| state.type_of(*u).capabilities.sub)
        && !attackers.iter().any(|u| state.type_of(*u).capabilities.destroyer)
    {
        return Some(BattleResult::empty());
    }
    None
}

/// Attackers weaker than defenders in both power and hit points.
fn is_outmatched(
    state: &GameState,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
) -> bool {
    let att = battle_participants(state, t, attackers);
    let def = battle_participants(state, t, defenders);
    let att_power = total_power(&unit_powers(state, &att, true, &[]));
    let def_power = total_power(&unit_powers(state, &def, false, &[]));
    att_power < def_power && hit_points(state, &att) < hit_points(state, &def)
}

/// Clear win when first-round expected hits cover the defenders twice over.
fn overwhelming_result(
    state: &GameState,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
) -> Option<BattleResult> {
    let att = battle_participants(state, t, attackers);
    let def = battle_participants(state, t, defenders);
    if att.is_empty() || def.is_empty() {
        return None;
    }
    let dice = state.dice_sides as f64;
    let att_power = total_power(&unit_powers(state, &att, true, &[])) as f64;
    let def_power = total_power(&unit_powers(state, &def, false, &[])) as f64;
    let def_hp = hit_points(state, &def) as f64;
    let clear = (def_power == 0.0 && att_power > 0.0) || att_power / dice >= 2.0 * def_hp;
    if !clear {
        return None;
    }

    // Defenders get one volley; the cheapest attackers absorb it
    let expected_losses = (def_power / dice).round() as usize;
    let mut by_cost = att.clone();
    by_cost.sort_by(|a, b| {
        state
            .unit_value(*a)
            .total_cmp(&state.unit_value(*b))
            .then_with(|| a.cmp(b))
    });
    let lost: Vec<UnitId> = by_cost.iter().take(expected_losses).copied().collect();
    let survivors: Vec<UnitId> = attackers.iter().copied().filter(|u| !lost.contains(u)).collect();
    let attacker_loss = state.tuv(&lost);
    let tuv_swing = if state.is_neutral_land(t) {
        -attacker_loss
    } else {
        state.tuv(&def) - attacker_loss
    };
    Some(BattleResult {
        win_percentage: 100.0,
        tuv_swing,
        has_land_unit_remaining: land_remaining(state, t, &survivors),
        average_attackers_remaining: survivors,
        average_defenders_remaining: Vec::new(),
        battle_rounds: 1.0,
        simulated_runs: 0,
    })
}

fn land_remaining(state: &GameState, t: TerritoryId, survivors: &[UnitId]) -> bool {
    if state.territory(t).is_land() {
        survivors.iter().any(|u| state.type_of(*u).is_land())
    } else {
        !survivors.is_empty()
    }
}

/// Builds one simulation side in casualty order.
fn build_side(
    state: &GameState,
    t: TerritoryId,
    units: &[UnitId],
    attacking: bool,
    marines: &[UnitId],
) -> Side {
    let fighters = battle_participants(state, t, units);
    let powers = unit_powers(state, &fighters, attacking, marines);
    let mut side = Side::default();
    for p in powers {
        let ut = state.type_of(p.unit);
        side.has_destroyer |= ut.capabilities.destroyer;
        side.fighters.push(Fighter {
            unit: p.unit,
            hp: ut.hit_points.saturating_sub(state.unit(p.unit).damage).max(1),
            strength: p.strength,
            rolls: p.rolls,
            value: ut.cost as f64,
            air: ut.is_air(),
            sub: ut.capabilities.sub,
        });
    }
    // Powerless units last, then weakest and cheapest first
    side.fighters.sort_by(|a, b| {
        (a.strength == 0)
            .cmp(&(b.strength == 0))
            .then_with(|| a.strength.cmp(&b.strength))
            .then_with(|| a.value.total_cmp(&b.value))
            .then_with(|| a.unit.cmp(&b.unit))
    });
    if !attacking && state.territory(t).is_land() {
        for u in units {
            let ut = state.type_of(*u);
            if ut.is_anti_air() {
                side.anti_air.push((ut.aa_attack, ut.aa_shots));
            }
        }
    }
    side
}

fn fingerprint(units: &[UnitId]) -> u64 {
    units.iter().fold(0x51_7C_C1_B7_27_22_0A_95, |h, u| mix(h ^ u.0 as u64))
}

/// Runs the dice simulation and aggregates it into a `BattleResult`.
pub fn calculate_battle_results(
    ctx: &PlanningContext,
    t: TerritoryId,
    attackers: &[UnitId],
    defenders: &[UnitId],
    bombarding: &[UnitId],
) -> BattleResult {
    let state = ctx.state;
    if let Some(result) = check_if_no_attackers_or_defenders(state, t, attackers, defenders) {
        return result;
    }

    let terr = state.territory(t);
    let marines: Vec<UnitId> = attackers
        .iter()
        .copied()
        .filter(|u| {
            state.type_of(*u).is_land()
                && state.location(*u).is_some_and(|l| state.territory(l).is_water())
        })
        .collect();
    let mut att_side = build_side(state, t, attackers, true, &marines);
    if terr.is_land() {
        att_side.bombard = bombarding
            .iter()
            .map(|u| state.type_of(*u).bombard)
            .filter(|b| *b > 0)
            .collect();
    }
    let def_side = build_side(state, t, defenders, false, &[]);
    if att_side.fighters.is_empty() || def_side.fighters.is_empty() {
        return BattleResult::empty();
    }

    let rules = DiceRules {
        dice_sides: state.dice_sides.max(1),
        low_luck: state.low_luck,
        max_rounds: ctx.config.max_battle_rounds.max(1),
    };
    let runs = if ctx.config.simulation_runs > 0 {
        ctx.config.simulation_runs as usize
    } else {
        let smaller = attackers.len().min(defenders.len());
        BASE_RUNS.saturating_sub(smaller).max(MIN_RUNS)
    };
    let seed = ctx.stream_seed(&[t.0 as u64, fingerprint(attackers), fingerprint(defenders)]);

    let outcomes: Vec<SimOutcome> = (0..runs as u64)
        .into_par_iter()
        .filter_map(|i| {
            if ctx.is_cancelled() {
                return None;
            }
            let mut rng = SmallRng::seed_from_u64(mix(seed ^ i));
            Some(simulate_battle(&att_side, &def_side, rules, &mut rng))
        })
        .collect();
    if outcomes.is_empty() {
        return BattleResult::empty();
    }

    let n = outcomes.len() as f64;
    let wins = outcomes.iter().filter(|o| o.attacker_won).count() as f64;
    let win_percentage = wins / n * 100.0;
    let attacker_loss = outcomes.iter().map(|o| o.attacker_loss).sum::<f64>() / n;
    let defender_loss = outcomes.iter().map(|o| o.defender_loss).sum::<f64>() / n;
    let battle_rounds = outcomes.iter().map(|o| o.rounds as f64).sum::<f64>() / n;

    let mut tuv_swing = if state.is_neutral_land(t) {
        -attacker_loss
    } else {
        defender_loss - attacker_loss
    };
    if terr.is_water() {
        let cargo: Vec<UnitId> = defenders
            .iter()
            .copied()
            .filter(|u| state.type_of(*u).is_land())
            .collect();
        tuv_swing += state.tuv(&cargo) * win_percentage / 100.0;
    }

    // The run whose survivor count is closest to the mean stands in for the average
    let mean_left = outcomes.iter().map(|o| o.attackers_left.len() as f64).sum::<f64>() / n;
    let representative = outcomes
        .iter()
        .min_by(|a, b| {
            let da = (a.attackers_left.len() as f64 - mean_left).abs();
            let db = (b.attackers_left.len() as f64 - mean_left).abs();
            da.total_cmp(&db)
        })
        .cloned()
        .unwrap_or_else(|| outcomes[0].clone());

    BattleResult {
        win_percentage,
        tuv_swing,
        has_land_unit_remaining: land_remaining(state, t, &representative.attackers_left),
        average_attackers_remaining: representative.attackers_left,
        average_defenders_remaining: representative.defenders_left,
        battle_rounds,
        simulated_runs: outcomes.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    struct Arena {
        state: GameState,
        field: TerritoryId,
    }

    fn arena(
        attack: &[(&str, usize)],
        defend: &[(&str, usize)],
    ) -> (Arena, Vec<UnitId>, Vec<UnitId>) {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let field = b.land("Field", 2, Some(blue));
        let kinds = |b: &mut StateBuilder, name: &str| match name {
            "inf" => b.infantry(),
            "art" => b.artillery(),
            "arm" => b.armour(),
            "ftr" => b.fighter(),
            "fac" => b.factory(),
            "aa" => b.aa_gun(),
            _ => unreachable!(),
        };
        let mut attackers = Vec::new();
        for (name, n) in attack {
            let k = kinds(&mut b, name);
            attackers.extend(b.add_units(red, k, field, *n));
        }
        let mut defenders = Vec::new();
        for (name, n) in defend {
            let k = kinds(&mut b, name);
            defenders.extend(b.add_units(blue, k, field, *n));
        }
        (
            Arena {
                state: b.build(),
                field,
            },
            attackers,
            defenders,
        )
    }

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        let config = EngineConfig {
            seed: 7,
            ..Default::default()
        };
        PlanningContext::new(state, PlayerId(0), config)
    }

    #[test]
    fn empty_garrison_is_a_certain_win_with_zero_swing() {
        let (a, att, _) = arena(&[("inf", 2)], &[]);
        let c = ctx(&a.state);
        let r = estimate(&c, a.field, &att, &[], &[], Perspective::Attacker);
        assert_eq!(r.win_percentage, 100.0);
        assert_eq!(r.tuv_swing, 0.0);
        assert!(r.has_land_unit_remaining);
        assert_eq!(r.simulated_runs, 0);
    }

    #[test]
    fn infrastructure_only_counts_as_empty() {
        let (a, att, def) = arena(&[("inf", 1)], &[("fac", 1)]);
        let c = ctx(&a.state);
        let r = estimate(&c, a.field, &att, &def, &[], Perspective::Attacker);
        assert_eq!(r.win_percentage, 100.0);
        assert_eq!(r.tuv_swing, 0.0);
    }

    #[test]
    fn air_alone_cannot_take_empty_land() {
        let (a, att, _) = arena(&[("ftr", 2)], &[]);
        let c = ctx(&a.state);
        let r = estimate(&c, a.field, &att, &[], &[], Perspective::Attacker);
        assert_eq!(r, BattleResult::empty());
    }

    #[test]
    fn overwhelming_force_short_circuits() {
        let (a, att, def) = arena(&[("arm", 10)], &[("inf", 1)]);
        let c = ctx(&a.state);
        let r = estimate(&c, a.field, &att, &def, &[], Perspective::Attacker);
        assert_eq!(r.simulated_runs, 0);
        assert_eq!(r.win_percentage, 100.0);
        assert!(r.tuv_swing > 0.0);
        assert!(r.has_land_unit_remaining);
    }

    #[test]
    fn hopeless_attack_short_circuits_to_loss() {
        let (a, att, def) = arena(&[("inf", 1)], &[("inf", 6)]);
        let c = ctx(&a.state);
        let r = estimate(&c, a.field, &att, &def, &[], Perspective::Attacker);
        assert_eq!(r.simulated_runs, 0);
        assert_eq!(r.win_percentage, 0.0);
        assert_eq!(r.average_defenders_remaining.len(), 6);
    }

    #[test]
    fn even_battle_is_simulated_and_deterministic() {
        let (a, att, def) = arena(&[("inf", 3), ("art", 3)], &[("inf", 4)]);
        let c = ctx(&a.state);
        let r1 = estimate(&c, a.field, &att, &def, &[], Perspective::Attacker);
        let r2 = estimate(&c, a.field, &att, &def, &[], Perspective::Attacker);
        assert!(r1.simulated_runs >= 16);
        assert_eq!(r1, r2);
        assert!(r1.win_percentage > 0.0 && r1.win_percentage <= 100.0);
        assert!(r1.battle_rounds >= 1.0);
    }

    #[test]
    fn stronger_attack_wins_more_often() {
        let (a, att, def) = arena(&[("arm", 6)], &[("inf", 3)]);
        let c = ctx(&a.state);
        let weak = calculate_battle_results(&c, a.field, &att[..3], &def, &[]);
        let strong = calculate_battle_results(&c, a.field, &att, &def, &[]);
        assert!(strong.win_percentage >= weak.win_percentage);
    }

    #[test]
    fn defend_perspective_short_circuits_clear_enemy_win() {
        let (a, att, def) = arena(&[("arm", 8)], &[("inf", 2)]);
        let c = ctx(&a.state);
        let r = estimate(&c, a.field, &att, &def, &[], Perspective::Defender);
        assert_eq!(r.win_percentage, 100.0);
        assert!(r.tuv_swing > 999.0);
        assert!(r.has_land_unit_remaining);
    }
}
