//! Scramble discovery: defensive air units that can launch from nearby air
//! bases into a battle.

use std::collections::BTreeMap;

use crate::board::{TerritoryId, UnitId};
use crate::context::PlanningContext;

/// Air units able to scramble into `target`, grouped by base territory.
///
/// Each base contributes at most its scramble cap; within a base the
/// strongest defenders come first.
pub fn find_scramble_options(
    ctx: &PlanningContext,
    target: TerritoryId,
) -> BTreeMap<TerritoryId, Vec<UnitId>> {
    let state = ctx.state;
    let player = ctx.player;
    let mut options = BTreeMap::new();

    for base in state.territory(target).neighbors() {
        let terr = state.territory(base);
        if !terr.is_land() || !state.is_allied_territory(base, player) {
            continue;
        }
        let cap: u32 = state
            .units_at(base)
            .filter(|u| state.is_allied(player, u.owner))
            .map(|u| state.unit_type(u.kind))
            .filter(|ut| ut.capabilities.air_base)
            .map(|ut| ut.max_scramble)
            .sum();
        if cap == 0 {
            continue;
        }
        let mut planes: Vec<UnitId> = state
            .owned_units(base, player)
            .into_iter()
            .filter(|u| {
                let ut = state.type_of(*u);
                ut.is_air() && ut.capabilities.can_scramble
            })
            .collect();
        planes.sort_by(|a, b| {
            let (ta, tb) = (state.type_of(*a), state.type_of(*b));
            (tb.defense * tb.defense_rolls)
                .cmp(&(ta.defense * ta.defense_rolls))
                .then_with(|| a.cmp(b))
        });
        planes.truncate(cap as usize);
        if !planes.is_empty() {
            options.insert(base, planes);
        }
    }
    options
}

/// All scramble candidates for `target`, strongest first.
pub fn scramble_candidates(
    ctx: &PlanningContext,
    target: TerritoryId,
) -> Vec<(UnitId, TerritoryId)> {
    let state = ctx.state;
    let mut all: Vec<(UnitId, TerritoryId)> = find_scramble_options(ctx, target)
        .into_iter()
        .flat_map(|(base, planes)| planes.into_iter().map(move |u| (u, base)))
        .collect();
    all.sort_by(|(a, _), (b, _)| {
        let (ta, tb) = (state.type_of(*a), state.type_of(*b));
        (tb.defense * tb.defense_rolls)
            .cmp(&(ta.defense * ta.defense_rolls))
            .then_with(|| a.cmp(b))
    });
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;

    #[test]
    fn base_cap_limits_scramblers() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let ftr = b.fighter();
        let base_t = b.air_base();
        let base = b.land("Base", 2, Some(red));
        let other = b.land("Other", 2, Some(red));
        let sea = b.water("Sea");
        b.connect(base, sea);
        b.connect(other, sea);
        b.add_unit(red, base_t, base);
        b.add_units(red, ftr, base, 3);
        b.add_units(red, ftr, other, 2);
        let state = b.build();
        let ctx = PlanningContext::new(&state, PlayerId(0), EngineConfig::default());

        let options = find_scramble_options(&ctx, sea);
        assert_eq!(options.len(), 1);
        assert_eq!(options[&base].len(), 2);
        assert_eq!(scramble_candidates(&ctx, sea).len(), 2);
    }
}
