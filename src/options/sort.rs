//! Unit orderings used by the allocator.
//!
//! Units with fewer choices are placed first so flexible units remain for
//! whatever is still short afterwards. Exact ties fall back to cost, type
//! name and id, or to a seeded coin flip when `randomize_ties` is set.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::battle::{total_power, unit_powers};
use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;

use super::attack_option::AttackOption;

/// Unit to candidate targets.
pub type UnitOptions = BTreeMap<UnitId, BTreeSet<TerritoryId>>;

/// Ordered `(unit, targets)` pairs.
pub type SortedOptions = Vec<(UnitId, Vec<TerritoryId>)>;

const TIE_STREAM: u64 = 0x7469_6573;

/// Secondary key for exact ties: seeded when ties are randomized, else the id.
fn tie_key(ctx: &PlanningContext, unit: UnitId) -> u64 {
    if ctx.config.randomize_ties {
        ctx.stream_seed(&[TIE_STREAM, unit.0 as u64])
    } else {
        unit.0 as u64
    }
}

fn by_cost_then_name(ctx: &PlanningContext, a: UnitId, b: UnitId) -> Ordering {
    let (ta, tb) = (ctx.state.type_of(a), ctx.state.type_of(b));
    ta.cost
        .cmp(&tb.cost)
        .then_with(|| ta.name.cmp(&tb.name))
        .then_with(|| tie_key(ctx, a).cmp(&tie_key(ctx, b)))
}

fn flatten(options: &UnitOptions) -> SortedOptions {
    options
        .iter()
        .map(|(u, ts)| (*u, ts.iter().copied().collect()))
        .collect()
}

/// Fewest options first, then cheapest, then type name.
pub fn sort_unit_move_options(ctx: &PlanningContext, options: &UnitOptions) -> SortedOptions {
    let mut sorted = flatten(options);
    sorted.sort_by(|(a, ta), (b, tb)| {
        ta.len()
            .cmp(&tb.len())
            .then_with(|| by_cost_then_name(ctx, *a, *b))
    });
    sorted
}

/// Targets of `targets` whose current assignment does not yet win.
fn needed(
    ctx: &PlanningContext,
    targets: &[TerritoryId],
    attacks: &mut BTreeMap<TerritoryId, AttackOption>,
) -> Vec<TerritoryId> {
    let threshold = ctx.win_percentage();
    targets
        .iter()
        .copied()
        .filter(|t| match attacks.get_mut(t) {
            Some(opt) => !opt.result(ctx).is_win(threshold),
            None => false,
        })
        .collect()
}

/// Fewest still-losing options first; units whose options all win already
/// sort last.
pub fn sort_unit_needed_options(
    ctx: &PlanningContext,
    options: &UnitOptions,
    attacks: &mut BTreeMap<TerritoryId, AttackOption>,
) -> SortedOptions {
    let mut keyed: Vec<(usize, UnitId, Vec<TerritoryId>)> = flatten(options)
        .into_iter()
        .map(|(u, ts)| {
            let n = needed(ctx, &ts, attacks).len();
            (if n == 0 { usize::MAX } else { n }, u, ts)
        })
        .collect();
    keyed.sort_by(|(na, a, _), (nb, b, _)| na.cmp(nb).then_with(|| by_cost_then_name(ctx, *a, *b)));
    keyed.into_iter().map(|(_, u, ts)| (u, ts)).collect()
}

/// Smallest power the unit adds to any still-losing option, per cost.
/// Air counts ten times its cost so it is held back for last.
fn attack_efficiency(
    ctx: &PlanningContext,
    unit: UnitId,
    targets: &[TerritoryId],
    attacks: &BTreeMap<TerritoryId, AttackOption>,
) -> f64 {
    let state = ctx.state;
    let mut min_power = u32::MAX;
    for t in targets {
        let Some(opt) = attacks.get(t) else {
            continue;
        };
        let attackers = opt.attackers();
        let before = total_power(&unit_powers(state, &attackers, true, &[]));
        let mut with = attackers;
        with.push(unit);
        let after = total_power(&unit_powers(state, &with, true, &[]));
        min_power = min_power.min(after.saturating_sub(before));
    }
    if min_power == u32::MAX {
        return 0.0;
    }
    let ut = state.type_of(unit);
    let mut cost = ut.cost.max(1) as f64;
    if ut.is_air() {
        cost *= 10.0;
    }
    min_power as f64 / cost
}

/// Fewest still-losing options first, then best attack power per cost.
pub fn sort_unit_needed_options_then_attack(
    ctx: &PlanningContext,
    options: &UnitOptions,
    attacks: &mut BTreeMap<TerritoryId, AttackOption>,
) -> SortedOptions {
    let mut keyed: Vec<(usize, f64, UnitId, Vec<TerritoryId>)> = Vec::with_capacity(options.len());
    for (u, ts) in flatten(options) {
        let need = needed(ctx, &ts, attacks);
        let n = if need.is_empty() { usize::MAX } else { need.len() };
        let efficiency = attack_efficiency(ctx, u, &need, attacks);
        keyed.push((n, efficiency, u, ts));
    }
    keyed.sort_by(|(na, ea, a, _), (nb, eb, b, _)| {
        na.cmp(nb)
            .then_with(|| eb.total_cmp(ea))
            .then_with(|| by_cost_then_name(ctx, *a, *b))
    });
    keyed.into_iter().map(|(_, _, u, ts)| (u, ts)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    #[test]
    fn fewer_options_sort_first() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 1, Some(red));
        let tank = b.add_unit(red, arm, home);
        let foot = b.add_unit(red, inf, home);
        let state = b.build();
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: 1, ..Default::default() },
        );

        let mut options = UnitOptions::new();
        options.insert(foot, BTreeSet::from([TerritoryId(1), TerritoryId(2)]));
        options.insert(tank, BTreeSet::from([TerritoryId(1)]));
        let sorted = sort_unit_move_options(&ctx, &options);
        assert_eq!(sorted[0].0, tank);
        assert_eq!(sorted[1].0, foot);
    }

    #[test]
    fn equal_options_sort_by_cost() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let arm = b.armour();
        let home = b.land("Home", 1, Some(red));
        let tank = b.add_unit(red, arm, home);
        let foot = b.add_unit(red, inf, home);
        let state = b.build();
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: 1, ..Default::default() },
        );

        let mut options = UnitOptions::new();
        options.insert(tank, BTreeSet::from([TerritoryId(1)]));
        options.insert(foot, BTreeSet::from([TerritoryId(1)]));
        let sorted = sort_unit_move_options(&ctx, &options);
        assert_eq!(sorted[0].0, foot);
    }

    #[test]
    fn randomized_ties_are_reproducible() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let home = b.land("Home", 1, Some(red));
        let units = b.add_units(red, inf, home, 6);
        let state = b.build();
        let config = EngineConfig {
            seed: 9,
            randomize_ties: true,
            ..Default::default()
        };
        let options: UnitOptions = units
            .iter()
            .map(|u| (*u, BTreeSet::from([TerritoryId(1)])))
            .collect();
        let a = sort_unit_move_options(
            &PlanningContext::new(&state, PlayerId(0), config.clone()),
            &options,
        );
        let b = sort_unit_move_options(
            &PlanningContext::new(&state, PlayerId(0), config),
            &options,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn air_sorts_after_land_with_same_need() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let blue = b.player("Blue", 1);
        let inf = b.infantry();
        let ftr = b.fighter();
        let home = b.land("Home", 1, Some(red));
        let target = b.land("Target", 1, Some(blue));
        b.connect(home, target);
        let plane = b.add_unit(red, ftr, home);
        let foot = b.add_unit(red, inf, home);
        b.add_units(blue, inf, target, 3);
        let state = b.build();
        let ctx = PlanningContext::new(
            &state,
            PlayerId(0),
            EngineConfig { seed: 1, ..Default::default() },
        );

        let mut opt = AttackOption::new(target);
        opt.max_units.extend([plane, foot]);
        let mut attacks = BTreeMap::from([(target, opt)]);
        let options: UnitOptions = [
            (plane, BTreeSet::from([target])),
            (foot, BTreeSet::from([target])),
        ]
            .into_iter()
            .collect();
        let sorted = sort_unit_needed_options_then_attack(&ctx, &options, &mut attacks);
        assert_eq!(sorted[0].0, foot);
        assert_eq!(sorted[1].0, plane);
    }
}
