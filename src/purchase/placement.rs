//! Turns a purchase plan into placements a factory can actually make.
//!
//! Each factory places at most its production value. Land and air units go
//! on the factory itself, sea units into water next to it. Units whose
//! intended territory has no capacity left are moved to the most valuable
//! holdable factory that still has room; units that fit nowhere are dropped
//! with a note.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::board::{GameState, TerritoryId, UnitTypeId};
use crate::context::PlanningContext;
use crate::defense::assess_hold;
use crate::error::EngineError;
use crate::eval::find_territory_values;
use crate::observer::PlanPhase;
use crate::options::find_max_enemy_attacks;

use super::place::{find_production_sites, ProductionSite};
use super::PurchasePlan;

/// Units placed into one territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub territory: TerritoryId,
    pub units: Vec<UnitTypeId>,
}

struct Capacity {
    sites: Vec<ProductionSite>,
    used: Vec<u32>,
}

impl Capacity {
    fn left(&self, si: usize) -> u32 {
        self.sites[si].capacity.saturating_sub(self.used[si])
    }

    /// Site whose factory can place `kind` into `t`, and the territory the
    /// unit actually lands in.
    fn slot_for(
        &self,
        state: &GameState,
        t: TerritoryId,
        kind: UnitTypeId,
    ) -> Option<(usize, TerritoryId)> {
        let sea = state.unit_type(kind).is_sea();
        let terr = state.territory(t);
        for (si, site) in self.sites.iter().enumerate() {
            if self.left(si) == 0 {
                continue;
            }
            if site.territory == t {
                return if sea {
                    site.places.get(1).map(|p| (si, p.territory))
                } else {
                    Some((si, t))
                };
            }
            if terr.is_water() && site.places.iter().skip(1).any(|p| p.territory == t) {
                let ut = state.unit_type(kind);
                if sea || ut.is_air() {
                    return Some((si, t));
                }
                return Some((si, site.territory));
            }
        }
        None
    }

    /// First site in `order` with room for `kind`.
    fn fallback(
        &self,
        state: &GameState,
        order: &[usize],
        kind: UnitTypeId,
    ) -> Option<(usize, TerritoryId)> {
        let sea = state.unit_type(kind).is_sea();
        order.iter().copied().filter(|si| self.left(*si) > 0).find_map(|si| {
            let site = &self.sites[si];
            if sea {
                site.places.get(1).map(|p| (si, p.territory))
            } else {
                Some((si, site.territory))
            }
        })
    }
}

fn check_ids(state: &GameState, plan: &PurchasePlan) -> Result<(), EngineError> {
    for tentative in &plan.placements {
        if tentative.territory.index() >= state.territories.len() {
            return Err(EngineError::UnknownTerritory(tentative.territory));
        }
        if let Some(kind) = tentative
            .units
            .iter()
            .find(|k| k.0 as usize >= state.unit_types.len())
        {
            return Err(EngineError::UnknownUnitType(*kind));
        }
    }
    Ok(())
}

/// Places the units of `plan` for `ctx.player`, respecting factory capacity.
pub fn plan_placement(
    ctx: &PlanningContext,
    plan: &PurchasePlan,
) -> Result<Vec<Placement>, EngineError> {
    let state = ctx.state;
    let player = ctx.player;
    check_ids(state, plan)?;
    ctx.observer().phase_started(PlanPhase::Placement, ctx.player_name());

    let sites = find_production_sites(state, player);
    let mut capacity = Capacity {
        used: vec![0; sites.len()],
        sites,
    };
    let mut placed: BTreeMap<TerritoryId, Vec<UnitTypeId>> = BTreeMap::new();
    let mut leftover: Vec<UnitTypeId> = Vec::new();

    for tentative in &plan.placements {
        ctx.check_cancelled()?;
        let t = tentative.territory;
        for &kind in &tentative.units {
            let ut = state.unit_type(kind);
            if ut.capabilities.factory {
                let terr = state.territory(t);
                if terr.is_land() && terr.owner == Some(player) && !state.has_factory(t) {
                    placed.entry(t).or_default().push(kind);
                } else {
                    ctx.observer().note(&format!("no room for a factory in {}", ctx.name(t)));
                }
                continue;
            }
            match capacity.slot_for(state, t, kind) {
                Some((si, at)) => {
                    capacity.used[si] += 1;
                    placed.entry(at).or_default().push(kind);
                }
                None => leftover.push(kind),
            }
        }
    }

    if !leftover.is_empty() {
        let order = fallback_order(ctx, &capacity.sites);
        for kind in leftover {
            match capacity.fallback(state, &order, kind) {
                Some((si, at)) => {
                    capacity.used[si] += 1;
                    placed.entry(at).or_default().push(kind);
                }
                None => ctx
                    .observer()
                    .note(&format!("{} left unplaced", state.unit_type(kind).name)),
            }
        }
    }

    let placements: Vec<Placement> = placed
        .into_iter()
        .map(|(territory, units)| Placement { territory, units })
        .collect();
    ctx.observer().phase_finished(PlanPhase::Placement, placements.len());
    Ok(placements)
}

/// Holdable factories, most valuable first.
fn fallback_order(ctx: &PlanningContext, sites: &[ProductionSite]) -> Vec<usize> {
    let state = ctx.state;
    let territories: BTreeSet<TerritoryId> = sites.iter().map(|s| s.territory).collect();
    let enemy = find_max_enemy_attacks(ctx, &territories, &BTreeSet::new());
    let values = find_territory_values(
        ctx,
        &BTreeSet::new(),
        &BTreeSet::new(),
        territories.iter().copied(),
    );
    let mut order: Vec<(usize, f64)> = sites
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            let t = s.territory;
            let defenders = state.allied_units(t, ctx.player);
            assess_hold(ctx, t, &enemy.units(t), &enemy.bombard(t), &defenders).can_hold
        })
        .map(|(i, s)| (i, values.get(s.territory)))
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    order.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PlayerId, StateBuilder};
    use crate::context::EngineConfig;
    use crate::purchase::TentativePlacement;

    fn ctx(state: &GameState) -> PlanningContext<'_> {
        PlanningContext::new(state, PlayerId(0), EngineConfig { seed: 3, ..Default::default() })
    }

    fn plan(placements: Vec<TentativePlacement>) -> PurchasePlan {
        PurchasePlan {
            placements,
            ..Default::default()
        }
    }

    #[test]
    fn capacity_overflow_moves_to_another_factory() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let fac = b.factory();
        let small = b.land("Small", 1, Some(red));
        let big = b.land("Big", 4, Some(red));
        b.connect(small, big);
        b.add_unit(red, fac, small);
        b.add_unit(red, fac, big);
        let state = b.build();

        let placements = plan_placement(
            &ctx(&state),
            &plan(vec![TentativePlacement {
                territory: small,
                units: vec![inf, inf, inf],
            }]),
        )
        .unwrap();
        let at = |t| {
            placements
                .iter()
                .find(|p| p.territory == t)
                .map_or(0, |p| p.units.len())
        };
        assert_eq!(at(small), 1);
        assert_eq!(at(big), 2);
    }

    #[test]
    fn sea_units_go_to_adjacent_water() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let dd = b.destroyer();
        let fac = b.factory();
        let port = b.land("Port", 3, Some(red));
        let sz = b.water("Bay");
        b.connect(port, sz);
        b.add_unit(red, fac, port);
        let state = b.build();

        let placements = plan_placement(
            &ctx(&state),
            &plan(vec![TentativePlacement {
                territory: port,
                units: vec![dd],
            }]),
        )
        .unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].territory, sz);
    }

    #[test]
    fn unknown_territory_is_rejected() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let _ = b.land("Home", 3, Some(red));
        let state = b.build();

        let err = plan_placement(
            &ctx(&state),
            &plan(vec![TentativePlacement {
                territory: TerritoryId(99),
                units: vec![inf],
            }]),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTerritory(TerritoryId(99))));
    }

    #[test]
    fn units_without_any_factory_are_dropped() {
        let mut b = StateBuilder::new();
        let red = b.player("Red", 0);
        let inf = b.infantry();
        let home = b.land("Home", 3, Some(red));
        let state = b.build();

        let placements = plan_placement(
            &ctx(&state),
            &plan(vec![TentativePlacement {
                territory: home,
                units: vec![inf],
            }]),
        )
        .unwrap();
        assert!(placements.is_empty());
    }
}
